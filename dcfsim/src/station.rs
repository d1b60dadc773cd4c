use std::convert::TryFrom;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;
use simproc::{Error, Key, Process, ProcessId, Scheduler, State, Step, Wake};

use crate::{BackoffHistogram, Channel, ConfigError, Frame, StationConfig, StationId, Timing};

/// Time it takes a station to sense the medium again after its backoff was interrupted.
pub const SENSING_DELAY: Duration = Duration::from_micros(9);

/// Arbitration priority of a frame is this value minus its air time in microseconds,
/// so that the longest frame wins.
const BIG_NUM: u64 = 10_000_000;

fn priority(frame_time: Duration) -> u64 {
    BIG_NUM.saturating_sub(u64::try_from(frame_time.as_micros()).unwrap_or(u64::MAX))
}

/// Upper limit (inclusive) of the backoff after `failures` consecutive collisions:
/// `min(2^failures * (cw_min + 1) - 1, cw_max)`.
///
/// # Examples
///
/// ```
/// # use dcfsim::backoff_upper_limit;
/// assert_eq!(backoff_upper_limit(15, 1023, 0), 15);
/// assert_eq!(backoff_upper_limit(15, 1023, 2), 63);
/// assert_eq!(backoff_upper_limit(15, 1023, 6), 1023);
/// assert_eq!(backoff_upper_limit(15, 1023, 100), 1023);
/// ```
#[must_use]
pub fn backoff_upper_limit(cw_min: u32, cw_max: u32, failures: u32) -> u32 {
    if failures >= 32 {
        return cw_max;
    }
    let limit = ((u64::from(cw_min) + 1) << failures) - 1;
    u32::try_from(limit.min(u64::from(cw_max))).unwrap_or(cw_max)
}

/// Draws the number of backoff slots uniformly from `0..=backoff_upper_limit(..)`.
pub fn draw_backoff<R: Rng + ?Sized>(rng: &mut R, config: &StationConfig, failures: u32) -> u32 {
    rng.gen_range(0..=backoff_upper_limit(config.cw_min, config.cw_max, failures))
}

/// Counters of a single station, kept in the simulation state so that they can be read once
/// the run is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationStats {
    /// Successful transmissions.
    pub succeeded: u64,
    /// Collided transmissions.
    pub failed: u64,
    /// Collisions since the last success or retry drop.
    pub failed_in_row: u32,
    /// Frames dropped after exceeding the retry limit.
    pub retry_drops: u64,
    /// Transmissions started.
    pub attempts: u64,
    /// Whether a transmission has started but its outcome is not known yet.
    pub in_flight: bool,
    /// Sum of the times between generating and delivering each delivered frame.
    pub total_time_to_send: Duration,
}

impl StationStats {
    /// Average time between generating and delivering a frame.
    #[must_use]
    pub fn mean_time_to_send(&self) -> Option<Duration> {
        if self.succeeded == 0 {
            None
        } else {
            let micros = self.total_time_to_send.as_micros() / u128::from(self.succeeded);
            Some(Duration::from_micros(
                u64::try_from(micros).unwrap_or(u64::MAX),
            ))
        }
    }
}

/// Keys of the values in the simulation state a station works with.
#[derive(Clone, Copy)]
pub struct StationKeys {
    /// The shared medium.
    pub channel: Key<Channel>,
    /// Histogram of drawn backoff values, shared by all stations.
    pub backoffs: Key<BackoffHistogram>,
    /// Counters of this station.
    pub stats: Key<StationStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Not started yet.
    Idle,
    /// Waiting for the medium to become idle before counting down the backoff.
    Sensing { remaining: Duration },
    /// Counting down the backoff.
    Backoff { remaining: Duration },
    /// Won the arbitration, waiting for the busy-lock.
    Seizing,
    /// Transmitting while holding the medium.
    Holding,
    /// Transmitted successfully while holding the medium, waiting for the ACK.
    AwaitingAck,
    /// Transmitting alongside the holder of the medium.
    Following,
    /// Transmitted successfully without holding the medium, waiting for the ACK.
    FollowerAck,
    /// Collided, waiting for the ACK that will never come.
    AckTimeout,
}

/// A contending station.
///
/// It generates frames back to back, and for each of them it counts down a random backoff and
/// then transmits, retrying after collisions until the retry limit is exceeded.
pub struct Station<R> {
    id: StationId,
    config: StationConfig,
    timing: Rc<dyn Timing>,
    frame_time: Duration,
    rng: R,
    keys: StationKeys,
    frame: Option<Frame>,
    phase: Phase,
    round: usize,
}

impl<R: Rng> Station<R> {
    /// Creates a station that will draw its backoffs from `rng`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid for the given timing.
    pub fn new(
        id: StationId,
        config: StationConfig,
        timing: Rc<dyn Timing>,
        rng: R,
        keys: StationKeys,
    ) -> Result<Self, ConfigError> {
        config.validate(timing.as_ref())?;
        let frame_time = timing
            .frame_duration(config.payload, config.mcs)
            .ok_or(ConfigError::UnsupportedMcs(config.mcs))?;
        Ok(Self {
            id,
            config,
            timing,
            frame_time,
            rng,
            keys,
            frame: None,
            phase: Phase::Idle,
            round: 0,
        })
    }

    fn log(&self, now: Duration, message: fmt::Arguments<'_>) {
        log::trace!(
            "Time: {} Station: {} Message: {}",
            now.as_micros(),
            self.id,
            message
        );
    }

    fn channel<'a>(&self, state: &'a mut State) -> simproc::Result<&'a mut Channel> {
        state.get_mut(self.keys.channel).ok_or(Error::MissingValue)
    }

    fn stats<'a>(&self, state: &'a mut State) -> simproc::Result<&'a mut StationStats> {
        state.get_mut(self.keys.stats).ok_or(Error::MissingValue)
    }

    fn frame(&self) -> simproc::Result<&Frame> {
        self.frame.as_ref().ok_or(Error::MissingValue)
    }

    /// Generates a fresh frame and starts counting down its backoff.
    fn new_cycle(&mut self, now: Duration, state: &mut State) -> simproc::Result<Step> {
        self.frame = Some(Frame::new(
            self.id,
            self.frame_time,
            self.config.payload,
            now,
        ));
        self.begin_backoff(now, state)
    }

    /// Draws a new backoff and waits for the medium to be idle.
    fn begin_backoff(&mut self, now: Duration, state: &mut State) -> simproc::Result<Step> {
        let failures = self.stats(state)?.failed_in_row;
        let slots = draw_backoff(&mut self.rng, &self.config, failures);
        let channel = self.channel(state)?;
        let stations = channel.stations();
        let tx_lock = channel.tx_lock();
        state
            .get_mut(self.keys.backoffs)
            .ok_or(Error::MissingValue)?
            .record(slots, stations);
        let remaining = self.timing.slot() * slots + self.timing.difs();
        self.log(
            now,
            format_args!("Starting to wait backoff: ({})u...", remaining.as_micros()),
        );
        self.phase = Phase::Sensing { remaining };
        Ok(Step::Acquire(tx_lock))
    }

    /// Joins the transmitting stations and either seizes the medium or follows its holder.
    fn attempt(
        &mut self,
        self_id: ProcessId,
        now: Duration,
        state: &mut State,
    ) -> simproc::Result<Step> {
        let duration = self.frame()?.duration;
        let priority = priority(duration);
        let channel = self.channel(state)?;
        self.round = channel.join_transmitting(self_id, now);
        let granted = channel.try_seize(self_id, priority);
        let tx_lock = channel.tx_lock();
        let stats = self.stats(state)?;
        stats.attempts += 1;
        stats.in_flight = true;
        if granted {
            self.phase = Phase::Seizing;
            Ok(Step::Acquire(tx_lock))
        } else {
            self.log(now, format_args!("There is a longer frame..."));
            self.phase = Phase::Following;
            Ok(Step::Wait(duration))
        }
    }

    /// Checks the outcome of the transmission and updates the counters. Returns `true` if the
    /// frame was delivered.
    fn evaluate(&mut self, now: Duration, state: &mut State) -> simproc::Result<bool> {
        let mut frame = self.frame.take().ok_or(Error::MissingValue)?;
        let channel = self.channel(state)?;
        let collided = channel.collided(self.round);
        if collided {
            channel.report_failure(self.round);
        } else {
            channel.report_success(self.round, u64::from(frame.payload));
        }
        let retry_limit = self.config.retry_limit;
        let stats = self.stats(state)?;
        stats.in_flight = false;
        if !collided {
            frame.complete(now);
            stats.succeeded += 1;
            stats.failed_in_row = 0;
            stats.total_time_to_send += frame.time_to_send().unwrap_or_default();
            self.log(now, format_args!("Successfully sent {}", frame));
            self.frame = Some(frame);
            return Ok(true);
        }
        frame.retransmissions += 1;
        stats.failed += 1;
        stats.failed_in_row += 1;
        let dropped = frame.retransmissions > retry_limit;
        if dropped {
            stats.retry_drops += 1;
            stats.failed_in_row = 0;
        }
        self.log(now, format_args!("There was a collision"));
        if dropped {
            log::debug!(
                "[{:?}] Station {} dropped a frame after {} retransmissions",
                now,
                self.id,
                frame.retransmissions
            );
            frame = Frame::new(self.id, self.frame_time, self.config.payload, now);
        }
        self.frame = Some(frame);
        Ok(false)
    }

    /// Frees the medium after the holder's busy period.
    fn release_medium(
        &self,
        self_id: ProcessId,
        scheduler: &mut Scheduler,
        state: &mut State,
        replace_tx_queue: bool,
    ) -> simproc::Result<()> {
        let channel = self.channel(state)?;
        scheduler.release(channel.tx_lock(), self_id)?;
        channel.clear_transmitting();
        channel.release_tx_queue(self_id)?;
        if replace_tx_queue {
            channel.replace_tx_queue();
        }
        Ok(())
    }
}

impl<R: Rng> Process for Station<R> {
    fn resume(
        &mut self,
        self_id: ProcessId,
        wake: Wake,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> simproc::Result<Step> {
        let now = scheduler.time();
        match (self.phase, wake) {
            (Phase::Idle, Wake::Start) | (Phase::FollowerAck, Wake::Timeout) => {
                self.new_cycle(now, state)
            }
            (Phase::Sensing { remaining }, Wake::Acquired(tx_lock)) => {
                scheduler.release(tx_lock, self_id)?;
                self.channel(state)?.join_back_off(self_id);
                self.phase = Phase::Backoff { remaining };
                Ok(Step::Wait(remaining))
            }
            (Phase::Backoff { .. }, Wake::Timeout) => {
                self.log(now, format_args!("Backoff waited, sending frame..."));
                self.channel(state)?.leave_back_off(self_id);
                self.attempt(self_id, now, state)
            }
            (Phase::Backoff { remaining }, Wake::Interrupted { elapsed }) => {
                self.log(
                    now,
                    format_args!("Waiting was interrupted, waiting to resume backoff..."),
                );
                match remaining.checked_sub(elapsed + SENSING_DELAY) {
                    Some(remaining) if remaining > Duration::default() => {
                        self.phase = Phase::Sensing { remaining };
                        Ok(Step::Acquire(self.channel(state)?.tx_lock()))
                    }
                    _ => self.attempt(self_id, now, state),
                }
            }
            (Phase::Seizing, Wake::Acquired(_)) => {
                for waiter in self.channel(state)?.take_back_off() {
                    scheduler.interrupt(waiter)?;
                }
                self.phase = Phase::Holding;
                Ok(Step::Wait(self.frame()?.duration))
            }
            (Phase::Holding, Wake::Timeout) => {
                if self.evaluate(now, state)? {
                    self.phase = Phase::AwaitingAck;
                    Ok(Step::Wait(self.timing.ack_duration()))
                } else {
                    self.release_medium(self_id, scheduler, state, true)?;
                    self.phase = Phase::AckTimeout;
                    Ok(Step::Wait(self.timing.ack_timeout()))
                }
            }
            (Phase::AwaitingAck, Wake::Timeout) => {
                self.release_medium(self_id, scheduler, state, false)?;
                self.new_cycle(now, state)
            }
            (Phase::Following, Wake::Timeout) => {
                if self.evaluate(now, state)? {
                    self.phase = Phase::FollowerAck;
                    Ok(Step::Wait(
                        self.timing.sifs() + self.timing.ack_duration(),
                    ))
                } else {
                    self.log(now, format_args!("Waiting ACK timeout"));
                    self.phase = Phase::AckTimeout;
                    Ok(Step::Wait(self.timing.ack_timeout()))
                }
            }
            (Phase::AckTimeout, Wake::Timeout) => self.begin_backoff(now, state),
            (_, wake) => Err(Error::UnexpectedWake {
                process: self_id,
                wake,
            }),
        }
    }
}
