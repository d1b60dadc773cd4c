use std::time::Duration;

use derive_more::{Display, From, Into};

use crate::{MutexId, Result, Scheduler, State};

/// Identifies a simulation process.
#[derive(Debug, Display, From, Into, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(usize);

/// The reason a process is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// First resumption after the process was registered.
    Start,
    /// The timeout requested with [`Step::Wait`] has elapsed.
    Timeout,
    /// The process now holds the mutex it requested with [`Step::Acquire`].
    Acquired(MutexId),
    /// Another process interrupted the current suspension. The pending timeout or acquisition
    /// is abandoned; `elapsed` is the time since the process suspended.
    Interrupted {
        /// Time spent suspended before the interrupt.
        elapsed: Duration,
    },
}

/// The next suspension requested by a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Resume with [`Wake::Timeout`] after the given time.
    Wait(Duration),
    /// Resume with [`Wake::Acquired`] once the mutex is held. Even a free mutex is granted
    /// through the event queue, after the events already scheduled for the current time.
    Acquire(MutexId),
    /// Never resume again.
    Finish,
}

/// A cooperative unit of execution.
///
/// Implementors are explicit state machines: the phase stored in `self` tells how to interpret
/// the next [`Wake`].
pub trait Process {
    /// Resumes the process and returns its next suspension.
    ///
    /// # Errors
    ///
    /// Any error aborts the simulation run.
    fn resume(
        &mut self,
        self_id: ProcessId,
        wake: Wake,
        scheduler: &mut Scheduler,
        state: &mut State,
    ) -> Result<Step>;
}
