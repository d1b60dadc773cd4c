use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use derive_more::{Display, From, Into};

use crate::{Error, ProcessId, Result};

/// Identifies a mutex owned by the [`Scheduler`](crate::Scheduler).
#[derive(Debug, Display, From, Into, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutexId(usize);

/// Capacity-1 lock with a FIFO queue of waiting processes.
///
/// Acquisition is a suspension, so the lock lives in the scheduler, which resumes the waiters.
#[derive(Debug, Default)]
pub(crate) struct MutexLock {
    owner: Option<ProcessId>,
    waiters: VecDeque<ProcessId>,
}

impl MutexLock {
    pub(crate) fn owner(&self) -> Option<ProcessId> {
        self.owner
    }

    /// Grants the lock to `process` if free, otherwise appends it to the waiters.
    /// Returns `true` if granted.
    pub(crate) fn request(&mut self, process: ProcessId) -> bool {
        if self.owner.is_none() {
            self.owner = Some(process);
            true
        } else {
            self.waiters.push_back(process);
            false
        }
    }

    /// Hands the lock over to the first waiter, which is returned, or leaves it free.
    pub(crate) fn hand_off(&mut self) -> Option<ProcessId> {
        self.owner = self.waiters.pop_front();
        self.owner
    }

    /// Removes `process` from the waiters. Returns `true` if it was waiting.
    pub(crate) fn withdraw(&mut self, process: ProcessId) -> bool {
        if let Some(pos) = self.waiters.iter().position(|&p| p == process) {
            self.waiters.remove(pos);
            true
        } else {
            false
        }
    }
}

/// Capacity-1 arbitration lock where a lower priority value wins.
///
/// Unlike the mutex, this lock never suspends anyone: [`PriorityLock::try_acquire`] answers
/// synchronously whether the request was granted. Requests that were not granted stay queued,
/// ordered by priority and then by issue order, and the best of them becomes the owner when
/// the lock is released. Queued requests are never cancelled one by one; instead, the whole
/// lock is discarded with [`PriorityLock::replace`].
///
/// # Examples
///
/// ```
/// # use simproc::{PriorityLock, ProcessId};
/// let mut lock = PriorityLock::default();
/// assert!(lock.try_acquire(ProcessId::from(0_usize), 10));
/// assert!(!lock.try_acquire(ProcessId::from(1_usize), 7));
/// assert_eq!(lock.pending(), 1);
/// let stale = lock.replace();
/// assert_eq!(stale.pending(), 1);
/// assert_eq!(lock.owner(), None);
/// ```
#[derive(Debug, Default)]
pub struct PriorityLock {
    owner: Option<ProcessId>,
    queue: BinaryHeap<Reverse<(u64, u64, ProcessId)>>,
    issued: u64,
}

impl PriorityLock {
    /// Requests the lock with the given priority. Returns `true` if it is granted right away,
    /// i.e., nobody holds the lock; otherwise the request is queued.
    pub fn try_acquire(&mut self, process: ProcessId, priority: u64) -> bool {
        let order = self.issued;
        self.issued += 1;
        if self.owner.is_none() && self.queue.is_empty() {
            self.owner = Some(process);
            true
        } else {
            self.queue.push(Reverse((priority, order, process)));
            false
        }
    }

    /// Releases the lock held by `process` and grants it to the best queued request, if any.
    /// Returns the new owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLockOwner`] if `process` does not hold the lock.
    pub fn release(&mut self, process: ProcessId) -> Result<Option<ProcessId>> {
        if self.owner != Some(process) {
            return Err(Error::NotLockOwner(process));
        }
        self.owner = self.queue.pop().map(|Reverse((_, _, next))| next);
        Ok(self.owner)
    }

    /// Installs a fresh, empty lock in place of this one, and returns the discarded lock
    /// together with all its stale requests.
    pub fn replace(&mut self) -> PriorityLock {
        std::mem::take(self)
    }

    /// The current owner.
    #[must_use]
    pub fn owner(&self) -> Option<ProcessId> {
        self.owner
    }

    /// Number of queued requests that were not granted.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
