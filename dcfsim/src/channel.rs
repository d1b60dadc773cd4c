use std::time::Duration;

use serde::Serialize;
use simproc::{MutexId, PriorityLock, ProcessId};

/// Summary of a single transmission round: every station that started transmitting while the
/// previous transmissions were already cleared from the medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Round {
    /// Time the first station started transmitting.
    pub start: Duration,
    /// Number of stations that transmitted.
    pub attempted: usize,
    /// Number of successful transmissions.
    pub succeeded: usize,
    /// Number of collided transmissions.
    pub failed: usize,
}

/// The shared medium.
///
/// Holds the arbitration lock deciding which transmitter occupies the medium, the ID of the
/// busy-lock mutex, the stations counting down their backoff, and the stations transmitting
/// in the current round.
#[derive(Debug)]
pub struct Channel {
    tx_queue: PriorityLock,
    tx_lock: MutexId,
    stations: usize,
    back_off: Vec<ProcessId>,
    transmitting: Vec<ProcessId>,
    round: usize,
    last_round_size: usize,
    failed: u64,
    succeeded: u64,
    bytes_sent: u64,
    history: Option<Vec<Round>>,
}

impl Channel {
    /// Creates an idle channel for a run with `stations` stations, using `tx_lock` as the
    /// busy-lock.
    #[must_use]
    pub fn new(tx_lock: MutexId, stations: usize) -> Self {
        Self {
            tx_queue: PriorityLock::default(),
            tx_lock,
            stations,
            back_off: Vec::new(),
            transmitting: Vec::new(),
            round: 0,
            last_round_size: 0,
            failed: 0,
            succeeded: 0,
            bytes_sent: 0,
            history: None,
        }
    }

    /// Keeps a [`Round`] summary of every round.
    #[must_use]
    pub fn with_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    /// The busy-lock mutex.
    #[must_use]
    pub fn tx_lock(&self) -> MutexId {
        self.tx_lock
    }

    /// Number of stations in the run.
    #[must_use]
    pub fn stations(&self) -> usize {
        self.stations
    }

    /// Adds `process` to the stations counting down their backoff.
    pub fn join_back_off(&mut self, process: ProcessId) {
        self.back_off.push(process);
    }

    /// Removes `process` from the stations counting down their backoff.
    pub fn leave_back_off(&mut self, process: ProcessId) {
        self.back_off.retain(|&p| p != process);
    }

    /// Removes and returns all the stations counting down their backoff.
    pub fn take_back_off(&mut self) -> Vec<ProcessId> {
        std::mem::take(&mut self.back_off)
    }

    /// Stations currently counting down their backoff.
    #[must_use]
    pub fn back_off(&self) -> &[ProcessId] {
        &self.back_off
    }

    /// Adds `process` to the transmitting stations, and returns the number of the round it
    /// belongs to. Joining an empty set starts a new round.
    pub fn join_transmitting(&mut self, process: ProcessId, now: Duration) -> usize {
        if self.transmitting.is_empty() {
            self.round += 1;
            if let Some(history) = &mut self.history {
                history.push(Round {
                    start: now,
                    ..Round::default()
                });
            }
        }
        self.transmitting.push(process);
        if let Some(round) = self.round_mut(self.round) {
            round.attempted += 1;
        }
        self.round
    }

    /// Ends the current round. Clearing an already empty set does nothing.
    pub fn clear_transmitting(&mut self) {
        if !self.transmitting.is_empty() {
            self.last_round_size = self.transmitting.len();
            self.transmitting.clear();
        }
    }

    /// Checks if the transmissions of the given round collided, i.e., more than one station
    /// transmitted in it.
    ///
    /// A round that has already been cleared is judged by its size at the time it was cleared,
    /// so a station evaluating its transmission after the holder of the medium ended the round
    /// sees the same outcome as the holder did.
    #[must_use]
    pub fn collided(&self, round: usize) -> bool {
        let size = if round == self.round && !self.transmitting.is_empty() {
            self.transmitting.len()
        } else {
            self.last_round_size
        };
        size > 1
    }

    /// Requests the arbitration lock; see [`PriorityLock::try_acquire`].
    pub fn try_seize(&mut self, process: ProcessId, priority: u64) -> bool {
        self.tx_queue.try_acquire(process, priority)
    }

    /// Releases the arbitration lock held by `process`.
    ///
    /// # Errors
    ///
    /// Returns [`simproc::Error::NotLockOwner`] if `process` does not hold it.
    pub fn release_tx_queue(&mut self, process: ProcessId) -> simproc::Result<()> {
        self.tx_queue.release(process).map(|_| ())
    }

    /// Discards the arbitration lock with all its queued requests, and installs a fresh one.
    pub fn replace_tx_queue(&mut self) {
        let stale = self.tx_queue.replace();
        log::trace!("Dropping {} stale arbitration requests", stale.pending());
    }

    /// The current holder of the arbitration lock.
    #[must_use]
    pub fn tx_queue_owner(&self) -> Option<ProcessId> {
        self.tx_queue.owner()
    }

    /// Records a successful transmission of `payload` bytes in `round`.
    pub fn report_success(&mut self, round: usize, payload: u64) {
        self.succeeded += 1;
        self.bytes_sent += payload;
        if let Some(round) = self.round_mut(round) {
            round.succeeded += 1;
        }
    }

    /// Records a collided transmission in `round`.
    pub fn report_failure(&mut self, round: usize) {
        self.failed += 1;
        if let Some(round) = self.round_mut(round) {
            round.failed += 1;
        }
    }

    /// Total number of collided transmissions.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Total number of successful transmissions.
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    /// Total payload delivered, in bytes.
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Number of rounds started so far.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.round
    }

    /// Summaries of all rounds, if enabled with [`Channel::with_history`].
    #[must_use]
    pub fn history(&self) -> Option<&[Round]> {
        self.history.as_deref()
    }

    fn round_mut(&mut self, round: usize) -> Option<&mut Round> {
        self.history
            .as_mut()
            .and_then(|history| history.get_mut(round.checked_sub(1)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn pid(id: usize) -> ProcessId {
        ProcessId::from(id)
    }

    fn channel() -> Channel {
        Channel::new(MutexId::from(0_usize), 4).with_history()
    }

    #[test]
    fn test_back_off_waiters() {
        let mut channel = channel();
        channel.join_back_off(pid(0));
        channel.join_back_off(pid(1));
        channel.join_back_off(pid(2));
        channel.leave_back_off(pid(1));
        assert_eq!(channel.back_off(), &[pid(0), pid(2)]);
        assert_eq!(channel.take_back_off(), vec![pid(0), pid(2)]);
        assert!(channel.back_off().is_empty());
    }

    #[test]
    fn test_single_transmitter_succeeds() {
        let mut channel = channel();
        let round = channel.join_transmitting(pid(0), Duration::from_micros(10));
        assert_eq!(round, 1);
        assert!(!channel.collided(round));
        channel.report_success(round, 1472);
        channel.clear_transmitting();
        channel.clear_transmitting();
        assert!(!channel.collided(round));
        assert_eq!(channel.succeeded(), 1);
        assert_eq!(channel.bytes_sent(), 1472);
        assert_eq!(
            channel.history(),
            Some(
                &[Round {
                    start: Duration::from_micros(10),
                    attempted: 1,
                    succeeded: 1,
                    failed: 0,
                }][..]
            )
        );
    }

    #[test]
    fn test_late_evaluation_sees_cleared_round() {
        let mut channel = channel();
        let round = channel.join_transmitting(pid(0), Duration::default());
        channel.join_transmitting(pid(1), Duration::default());
        assert!(channel.collided(round));
        channel.report_failure(round);
        channel.clear_transmitting();
        assert!(channel.collided(round));
        channel.report_failure(round);

        let next = channel.join_transmitting(pid(2), Duration::from_micros(500));
        assert_eq!(next, 2);
        assert!(!channel.collided(next));
        assert_eq!(channel.rounds(), 2);
        assert_eq!(channel.failed(), 2);
        let history = channel.history().unwrap();
        assert_eq!(history[0].attempted, 2);
        assert_eq!(history[0].failed, 2);
        assert_eq!(history[1].attempted, 1);
    }

    #[test]
    fn test_tx_queue_replacement() {
        let mut channel = channel();
        assert!(channel.try_seize(pid(0), 100));
        assert!(!channel.try_seize(pid(1), 100));
        assert_eq!(
            channel.release_tx_queue(pid(1)),
            Err(simproc::Error::NotLockOwner(pid(1)))
        );
        channel.release_tx_queue(pid(0)).unwrap();
        assert_eq!(channel.tx_queue_owner(), Some(pid(1)));
        channel.replace_tx_queue();
        assert_eq!(channel.tx_queue_owner(), None);
        assert!(channel.try_seize(pid(2), 100));
    }

    #[test]
    fn test_history_disabled() {
        let mut channel = Channel::new(MutexId::from(0_usize), 1);
        let round = channel.join_transmitting(pid(0), Duration::default());
        channel.report_success(round, 10);
        assert_eq!(channel.history(), None);
        assert_eq!(channel.rounds(), 1);
    }

    proptest! {
        #[test]
        fn test_collision_iff_multiple_transmitters(size in 1..10_usize, clear_at in 0..10_usize) {
            let mut channel = channel();
            let round = channel.join_transmitting(pid(0), Duration::default());
            for id in 1..size {
                channel.join_transmitting(pid(id), Duration::default());
            }
            for evaluated in 0..size {
                if evaluated == clear_at {
                    channel.clear_transmitting();
                }
                if channel.collided(round) {
                    channel.report_failure(round);
                } else {
                    channel.report_success(round, 1);
                }
            }
            let history = channel.history().unwrap();
            prop_assert_eq!(history.len(), 1);
            prop_assert_eq!(history[0].attempted, size);
            prop_assert_eq!(history[0].succeeded + history[0].failed, size);
            if size == 1 {
                prop_assert_eq!(history[0].succeeded, 1);
            } else {
                prop_assert_eq!(history[0].failed, size);
            }
        }
    }
}
