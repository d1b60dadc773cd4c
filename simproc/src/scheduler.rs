use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use crate::resource::MutexLock;
use crate::{Error, MutexId, ProcessId, Result, Step, Wake};

/// Entry type stored in the scheduler, including the wake value, process ID, and the time when
/// it is supposed to occur. The sequence number keeps events due at the same time in the order
/// they were scheduled.
#[derive(Debug)]
struct EventEntry {
    time: Reverse<Duration>,
    seq: Reverse<u64>,
    process: ProcessId,
    wake: Wake,
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// What a process is currently waiting for.
///
/// `token` is the sequence number of the event that is expected to resume the process; any
/// other event popped for this process is stale and gets discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suspension {
    /// Registered, waiting for its first resumption.
    Starting { token: u64 },
    /// Waiting for a timeout.
    Timeout { since: Duration, token: u64 },
    /// Queued on a mutex held by another process.
    Acquiring { mutex: MutexId, since: Duration },
    /// Already owns the mutex, waiting for the grant event.
    Granted {
        mutex: MutexId,
        since: Duration,
        token: u64,
    },
    /// Interrupted, waiting to be resumed out of turn.
    Interrupted,
    /// Currently being resumed.
    Running,
    /// Will never be resumed again.
    Finished,
}

impl Suspension {
    fn token(self) -> Option<u64> {
        match self {
            Self::Starting { token }
            | Self::Timeout { token, .. }
            | Self::Granted { token, .. } => Some(token),
            _ => None,
        }
    }
}

/// Scheduler is used to keep the current time, the upcoming resumptions, pending interrupts,
/// and the mutexes that processes suspend on.
pub struct Scheduler {
    events: BinaryHeap<EventEntry>,
    interrupts: VecDeque<(ProcessId, Wake)>,
    suspensions: Vec<Suspension>,
    mutexes: Vec<MutexLock>,
    next_seq: u64,
    now: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            events: BinaryHeap::new(),
            interrupts: VecDeque::new(),
            suspensions: Vec::new(),
            mutexes: Vec::new(),
            next_seq: 0,
            now: Duration::default(),
        }
    }
}

impl Scheduler {
    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> Duration {
        self.now
    }

    /// Number of scheduled events, including stale ones that will be discarded.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Checks whether `process` is waiting on a timeout or a mutex, i.e., can be interrupted.
    #[must_use]
    pub fn is_suspended(&self, process: ProcessId) -> bool {
        matches!(
            self.suspensions.get(usize::from(process)),
            Some(Suspension::Timeout { .. })
                | Some(Suspension::Acquiring { .. })
                | Some(Suspension::Granted { .. })
        )
    }

    /// Returns the current owner of `mutex`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMutex`] if the mutex was not created by this scheduler.
    pub fn owner(&self, mutex: MutexId) -> Result<Option<ProcessId>> {
        self.mutexes
            .get(usize::from(mutex))
            .map(MutexLock::owner)
            .ok_or(Error::UnknownMutex(mutex))
    }

    /// Releases `mutex` held by `process`. The first waiter, if any, becomes the owner and is
    /// resumed at the current time, after the events already scheduled for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutex is unknown or `process` does not hold it.
    pub fn release(&mut self, mutex: MutexId, process: ProcessId) -> Result<()> {
        let lock = self.mutex_mut(mutex)?;
        if lock.owner() != Some(process) {
            return Err(Error::NotMutexOwner { process, mutex });
        }
        self.hand_off(mutex)
    }

    /// Interrupts the current suspension of `process`. Its pending timeout is discarded, or it
    /// stops waiting for its mutex (giving up ownership if it had already been granted).
    /// The process is resumed with [`Wake::Interrupted`] before any other scheduled event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSuspended`] if the process is not waiting on a timeout or a mutex,
    /// e.g., it is the one currently running, it has already been interrupted, or has finished.
    pub fn interrupt(&mut self, process: ProcessId) -> Result<()> {
        let suspension = self
            .suspensions
            .get(usize::from(process))
            .copied()
            .ok_or(Error::UnknownProcess(process))?;
        let since = match suspension {
            Suspension::Timeout { since, .. } => since,
            Suspension::Acquiring { mutex, since } => {
                self.mutex_mut(mutex)?.withdraw(process);
                since
            }
            Suspension::Granted { mutex, since, .. } => {
                self.hand_off(mutex)?;
                since
            }
            _ => return Err(Error::NotSuspended(process)),
        };
        let elapsed = self.time() - since;
        log::trace!(
            "[{:?}] Interrupting process {} after {:?}",
            self.time(),
            process,
            elapsed
        );
        self.suspensions[usize::from(process)] = Suspension::Interrupted;
        self.interrupts
            .push_back((process, Wake::Interrupted { elapsed }));
        Ok(())
    }

    pub(crate) fn add_mutex(&mut self) -> MutexId {
        self.mutexes.push(MutexLock::default());
        MutexId::from(self.mutexes.len() - 1)
    }

    pub(crate) fn register_process(&mut self) -> ProcessId {
        let id = ProcessId::from(self.suspensions.len());
        let token = self.schedule(Duration::default(), id, Wake::Start);
        self.suspensions.push(Suspension::Starting { token });
        id
    }

    /// Records the suspension requested by the process that has just been resumed.
    pub(crate) fn suspend(&mut self, process: ProcessId, step: Step) -> Result<()> {
        let now = self.time();
        let suspension = match step {
            Step::Wait(delay) => Suspension::Timeout {
                since: now,
                token: self.schedule(delay, process, Wake::Timeout),
            },
            Step::Acquire(mutex) => {
                let lock = self.mutex_mut(mutex)?;
                if lock.owner() == Some(process) {
                    return Err(Error::Reentrant { process, mutex });
                }
                if lock.request(process) {
                    Suspension::Granted {
                        mutex,
                        since: now,
                        token: self.schedule(Duration::default(), process, Wake::Acquired(mutex)),
                    }
                } else {
                    Suspension::Acquiring { mutex, since: now }
                }
            }
            Step::Finish => Suspension::Finished,
        };
        *self
            .suspensions
            .get_mut(usize::from(process))
            .ok_or(Error::UnknownProcess(process))? = suspension;
        Ok(())
    }

    /// Removes and returns the next process to resume, and advances the clock.
    /// Pending interrupts go first; then the earliest event due strictly before `horizon`.
    /// Stale events are skipped.
    pub(crate) fn next_wake(&mut self, horizon: Option<Duration>) -> Option<(ProcessId, Wake)> {
        if let Some((process, wake)) = self.interrupts.pop_front() {
            self.suspensions[usize::from(process)] = Suspension::Running;
            return Some((process, wake));
        }
        loop {
            let due = self.events.peek()?.time.0;
            if horizon.map_or(false, |horizon| due >= horizon) {
                return None;
            }
            let entry = self.events.pop()?;
            let suspension = &mut self.suspensions[usize::from(entry.process)];
            if suspension.token() == Some(entry.seq.0) {
                *suspension = Suspension::Running;
                self.now = due;
                return Some((entry.process, entry.wake));
            }
        }
    }

    /// Moves the clock forward to `time`; does nothing if it is already past it.
    pub(crate) fn advance_to(&mut self, time: Duration) {
        if self.time() < time {
            self.now = time;
        }
    }

    /// Schedules `wake` to be delivered to `process` at `self.time() + delay`, and returns the
    /// sequence number identifying this event.
    fn schedule(&mut self, delay: Duration, process: ProcessId, wake: Wake) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(EventEntry {
            time: Reverse(self.time() + delay),
            seq: Reverse(seq),
            process,
            wake,
        });
        seq
    }

    fn mutex_mut(&mut self, mutex: MutexId) -> Result<&mut MutexLock> {
        self.mutexes
            .get_mut(usize::from(mutex))
            .ok_or(Error::UnknownMutex(mutex))
    }

    fn hand_off(&mut self, mutex: MutexId) -> Result<()> {
        if let Some(next) = self.mutex_mut(mutex)?.hand_off() {
            let since = match self.suspensions[usize::from(next)] {
                Suspension::Acquiring { since, .. } => since,
                _ => return Err(Error::NotSuspended(next)),
            };
            let token = self.schedule(Duration::default(), next, Wake::Acquired(mutex));
            self.suspensions[usize::from(next)] = Suspension::Granted {
                mutex,
                since,
                token,
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_event_entry_cmp() {
        let entry = |time, seq| EventEntry {
            time: Reverse(Duration::from_micros(time)),
            seq: Reverse(seq),
            process: ProcessId::from(0_usize),
            wake: Wake::Timeout,
        };
        assert_eq!(entry(1, 1).cmp(&entry(2, 0)), Ordering::Greater);
        assert_eq!(entry(1, 0).cmp(&entry(1, 1)), Ordering::Greater);
        assert_eq!(entry(3, 7), entry(3, 7));
    }

    #[test]
    fn test_scheduler() {
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.time(), Duration::new(0, 0));

        let a = scheduler.register_process();
        let b = scheduler.register_process();
        assert_eq!(scheduler.next_wake(None), Some((a, Wake::Start)));
        scheduler
            .suspend(a, Step::Wait(Duration::from_micros(5)))
            .unwrap();
        assert_eq!(scheduler.next_wake(None), Some((b, Wake::Start)));
        scheduler
            .suspend(b, Step::Wait(Duration::from_micros(1)))
            .unwrap();
        assert!(scheduler.is_suspended(a));
        assert!(scheduler.is_suspended(b));

        assert_eq!(
            scheduler.next_wake(Some(Duration::from_micros(1))),
            None
        );
        assert_eq!(scheduler.next_wake(None), Some((b, Wake::Timeout)));
        assert_eq!(scheduler.time(), Duration::from_micros(1));

        scheduler.interrupt(a).unwrap();
        assert!(!scheduler.is_suspended(a));
        assert_eq!(scheduler.interrupt(a), Err(Error::NotSuspended(a)));
        assert_eq!(scheduler.interrupt(b), Err(Error::NotSuspended(b)));
        assert_eq!(
            scheduler.next_wake(None),
            Some((
                a,
                Wake::Interrupted {
                    elapsed: Duration::from_micros(1)
                }
            ))
        );
        scheduler.suspend(a, Step::Finish).unwrap();
        scheduler.suspend(b, Step::Finish).unwrap();

        // The timeout of `a` is stale now.
        assert_eq!(scheduler.pending_events(), 1);
        assert_eq!(scheduler.next_wake(None), None);
        assert_eq!(scheduler.time(), Duration::from_micros(1));
    }

    #[test]
    fn test_interrupt_withdraws_mutex_waiter() {
        let mut scheduler = Scheduler::default();
        let mutex = scheduler.add_mutex();
        let a = scheduler.register_process();
        let b = scheduler.register_process();
        let c = scheduler.register_process();
        for process in [a, b, c].iter().copied() {
            assert_eq!(scheduler.next_wake(None), Some((process, Wake::Start)));
            scheduler.suspend(process, Step::Acquire(mutex)).unwrap();
        }
        assert_eq!(scheduler.owner(mutex), Ok(Some(a)));
        scheduler.interrupt(b).unwrap();
        assert_eq!(
            scheduler.next_wake(None),
            Some((
                b,
                Wake::Interrupted {
                    elapsed: Duration::default()
                }
            ))
        );
        scheduler.suspend(b, Step::Finish).unwrap();
        assert_eq!(scheduler.next_wake(None), Some((a, Wake::Acquired(mutex))));
        assert_eq!(
            scheduler.release(mutex, b),
            Err(Error::NotMutexOwner { process: b, mutex })
        );
        scheduler.release(mutex, a).unwrap();
        assert_eq!(scheduler.owner(mutex), Ok(Some(c)));
        scheduler.suspend(a, Step::Finish).unwrap();
        assert_eq!(scheduler.next_wake(None), Some((c, Wake::Acquired(mutex))));
        assert_eq!(
            scheduler.suspend(c, Step::Acquire(mutex)),
            Err(Error::Reentrant { process: c, mutex })
        );
    }
}
