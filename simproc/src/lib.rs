#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

//! This is a process-oriented simulation kernel that provides the mechanisms such as: scheduler,
//! clock, suspendable processes, interrupts, locks, and a shared value store.
//!
//! A process is an explicit state machine implementing [`Process`]. Each time it is resumed, it
//! returns a [`Step`] describing its next suspension: a timeout, or an acquisition of a mutex.
//! The [`Scheduler`] resumes it again once the suspension resolves, or earlier, with
//! [`Wake::Interrupted`], if another process interrupts it.
//!
//! # Examples
//!
//! ```
//! # use std::time::Duration;
//! # use simproc::{Process, ProcessId, Scheduler, Simulation, State, Step, Wake};
//! struct Ticker {
//!     ticks: u32,
//! }
//!
//! impl Process for Ticker {
//!     fn resume(
//!         &mut self,
//!         _: ProcessId,
//!         _: Wake,
//!         _: &mut Scheduler,
//!         _: &mut State,
//!     ) -> simproc::Result<Step> {
//!         self.ticks += 1;
//!         Ok(Step::Wait(Duration::from_micros(10)))
//!     }
//! }
//!
//! let mut sim = Simulation::default();
//! sim.add_process(Ticker { ticks: 0 });
//! let end = sim.run_until(Duration::from_micros(35)).unwrap();
//! assert_eq!(end, Duration::from_micros(35));
//! ```

use std::time::Duration;

pub use process::{Process, ProcessId, Step, Wake};
pub use resource::{MutexId, PriorityLock};
pub use scheduler::Scheduler;
pub use state::{Key, State};

mod process;
mod resource;
mod scheduler;
mod state;

/// Internal consistency errors of the simulation kernel.
///
/// None of these are expected in a correct model; each one aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Only a process waiting on a timeout or a mutex can be interrupted.
    #[error("process {0} is not suspended and cannot be interrupted")]
    NotSuspended(ProcessId),
    /// A mutex was released by a process that does not hold it.
    #[error("process {process} released mutex {mutex} without holding it")]
    NotMutexOwner {
        /// The offending process.
        process: ProcessId,
        /// The mutex it tried to release.
        mutex: MutexId,
    },
    /// A process tried to acquire a mutex it already holds.
    #[error("process {process} already holds mutex {mutex}")]
    Reentrant {
        /// The offending process.
        process: ProcessId,
        /// The mutex it tried to acquire.
        mutex: MutexId,
    },
    /// The priority lock was released by a process that does not hold it.
    #[error("process {0} released the priority lock without holding it")]
    NotLockOwner(ProcessId),
    /// The mutex ID was not issued by this scheduler.
    #[error("unknown mutex {0}")]
    UnknownMutex(MutexId),
    /// The process ID was not issued by this simulation, or the process has finished.
    #[error("unknown or finished process {0}")]
    UnknownProcess(ProcessId),
    /// A process was resumed with a wake its current phase does not expect.
    #[error("process {process} cannot handle {wake:?} in its current phase")]
    UnexpectedWake {
        /// The resumed process.
        process: ProcessId,
        /// The wake value it received.
        wake: Wake,
    },
    /// A value expected in the [`State`] store was not found.
    #[error("value missing from the simulation state")]
    MissingValue,
}

/// Result alias using [`Error`](enum.Error.html).
pub type Result<T> = std::result::Result<T, Error>;

/// The main simulation object: the clock and queue, the shared state, and all processes.
pub struct Simulation {
    /// Current state of the simulation meant to be mutated by the processes.
    pub state: State,
    /// Schedules resumptions and maintains the clock.
    pub scheduler: Scheduler,
    processes: Vec<Option<Box<dyn Process>>>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            state: State::default(),
            scheduler: Scheduler::default(),
            processes: Vec::new(),
        }
    }
}

impl Simulation {
    /// Registers a new process. It will be resumed with [`Wake::Start`] at the current time,
    /// after all the processes registered before it.
    pub fn add_process<P: Process + 'static>(&mut self, process: P) -> ProcessId {
        let id = self.scheduler.register_process();
        self.processes.push(Some(Box::new(process)));
        id
    }

    /// Creates a new capacity-1 FIFO mutex.
    pub fn add_mutex(&mut self) -> MutexId {
        self.scheduler.add_mutex()
    }

    /// Resumes the next process. Returns `false` if there was nothing left to resume.
    ///
    /// # Errors
    ///
    /// Returns an error if the resumed process or the scheduler detects an inconsistency.
    pub fn step(&mut self) -> Result<bool> {
        self.step_before(None)
    }

    /// Runs until the event queue is exhausted or the next event is due at or after `horizon`.
    /// Afterwards, the clock reads `horizon`, which is also returned.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by a process or the scheduler; the simulation must not
    /// be continued afterwards.
    pub fn run_until(&mut self, horizon: Duration) -> Result<Duration> {
        while self.step_before(Some(horizon))? {}
        self.scheduler.advance_to(horizon);
        Ok(self.scheduler.time())
    }

    fn step_before(&mut self, horizon: Option<Duration>) -> Result<bool> {
        let (id, wake) = match self.scheduler.next_wake(horizon) {
            Some(next) => next,
            None => return Ok(false),
        };
        let slot = self
            .processes
            .get_mut(usize::from(id))
            .ok_or(Error::UnknownProcess(id))?;
        let mut process = slot.take().ok_or(Error::UnknownProcess(id))?;
        let step = process.resume(id, wake, &mut self.scheduler, &mut self.state);
        if !matches!(step, Ok(Step::Finish)) {
            self.processes[usize::from(id)] = Some(process);
        }
        self.scheduler.suspend(id, step?)?;
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Records every wake it receives, and replays a fixed script of steps.
    struct Scripted {
        script: Vec<Step>,
        log: Key<Vec<(Duration, ProcessId, Wake)>>,
    }

    impl Process for Scripted {
        fn resume(
            &mut self,
            self_id: ProcessId,
            wake: Wake,
            scheduler: &mut Scheduler,
            state: &mut State,
        ) -> Result<Step> {
            state
                .get_mut(self.log)
                .ok_or(Error::MissingValue)?
                .push((scheduler.time(), self_id, wake));
            if let Wake::Acquired(mutex) = wake {
                scheduler.release(mutex, self_id)?;
            }
            if self.script.is_empty() {
                Ok(Step::Finish)
            } else {
                Ok(self.script.remove(0))
            }
        }
    }

    #[test]
    fn test_same_time_events_are_fifo() {
        let mut sim = Simulation::default();
        let log = sim.state.insert(Vec::new());
        let micros = Duration::from_micros;
        let a = sim.add_process(Scripted {
            script: vec![Step::Wait(micros(5)), Step::Wait(micros(5))],
            log,
        });
        let b = sim.add_process(Scripted {
            script: vec![Step::Wait(micros(10))],
            log,
        });
        sim.run_until(micros(100)).unwrap();
        let log = sim.state.remove(log).unwrap();
        assert_eq!(
            log,
            vec![
                (micros(0), a, Wake::Start),
                (micros(0), b, Wake::Start),
                (micros(5), a, Wake::Timeout),
                (micros(10), b, Wake::Timeout),
                (micros(10), a, Wake::Timeout),
            ]
        );
        assert_eq!(sim.scheduler.time(), micros(100));
    }

    #[test]
    fn test_horizon_is_exclusive() {
        let mut sim = Simulation::default();
        let log = sim.state.insert(Vec::new());
        sim.add_process(Scripted {
            script: vec![Step::Wait(Duration::from_micros(10))],
            log,
        });
        sim.run_until(Duration::from_micros(10)).unwrap();
        assert_eq!(sim.state.get(log).unwrap().len(), 1);
        assert!(sim.step().unwrap());
        assert_eq!(sim.state.get(log).unwrap().len(), 2);
        assert!(!sim.step().unwrap());
    }

    #[test]
    fn test_key_of_another_simulation_is_missing_value() {
        let mut other = State::default();
        let log = other.insert(Vec::new());
        let mut sim = Simulation::default();
        sim.add_process(Scripted {
            script: Vec::new(),
            log,
        });
        assert_eq!(
            sim.run_until(Duration::from_micros(1)),
            Err(Error::MissingValue)
        );
        assert_eq!(other.get(log).map(Vec::len), Some(0));
    }

    #[test]
    fn test_mutex_grants_resume_through_queue() {
        let mut sim = Simulation::default();
        let log = sim.state.insert(Vec::new());
        let mutex = sim.add_mutex();
        let a = sim.add_process(Scripted {
            script: vec![Step::Acquire(mutex)],
            log,
        });
        let b = sim.add_process(Scripted {
            script: vec![Step::Acquire(mutex)],
            log,
        });
        sim.run_until(Duration::from_micros(1)).unwrap();
        let log = sim.state.remove(log).unwrap();
        let zero = Duration::default();
        assert_eq!(
            log,
            vec![
                (zero, a, Wake::Start),
                (zero, b, Wake::Start),
                (zero, a, Wake::Acquired(mutex)),
                (zero, b, Wake::Acquired(mutex)),
            ]
        );
        assert_eq!(sim.scheduler.owner(mutex).unwrap(), None);
    }

    /// Interrupts the given process after a delay, then finishes.
    struct Interrupter {
        delay: Duration,
        target: ProcessId,
        fired: bool,
    }

    impl Process for Interrupter {
        fn resume(
            &mut self,
            _: ProcessId,
            _: Wake,
            scheduler: &mut Scheduler,
            _: &mut State,
        ) -> Result<Step> {
            if self.fired {
                scheduler.interrupt(self.target)?;
                Ok(Step::Finish)
            } else {
                self.fired = true;
                Ok(Step::Wait(self.delay))
            }
        }
    }

    #[test]
    fn test_interrupt_reports_elapsed_time() {
        let mut sim = Simulation::default();
        let log = sim.state.insert(Vec::new());
        let micros = Duration::from_micros;
        let sleeper = sim.add_process(Scripted {
            script: vec![Step::Wait(micros(100)), Step::Wait(micros(1))],
            log,
        });
        sim.add_process(Interrupter {
            delay: micros(30),
            target: sleeper,
            fired: false,
        });
        sim.run_until(micros(1000)).unwrap();
        let log = sim.state.remove(log).unwrap();
        assert_eq!(
            log,
            vec![
                (micros(0), sleeper, Wake::Start),
                (
                    micros(30),
                    sleeper,
                    Wake::Interrupted {
                        elapsed: micros(30)
                    }
                ),
                (micros(31), sleeper, Wake::Timeout),
            ]
        );
    }

    #[test]
    fn test_interrupting_finished_process_fails() {
        let mut sim = Simulation::default();
        let log = sim.state.insert(Vec::new());
        let micros = Duration::from_micros;
        let quick = sim.add_process(Scripted {
            script: Vec::new(),
            log,
        });
        sim.add_process(Interrupter {
            delay: micros(5),
            target: quick,
            fired: false,
        });
        assert_eq!(
            sim.run_until(micros(10)),
            Err(Error::NotSuspended(quick))
        );
    }
}
