//! # Counting Semaphores
//!
//! A semaphore is a signed counter in the kernel's semaphore table, named by
//! a [`SemaphoreId`]. A non-negative count is the number of free units; a
//! negative count is the number of threads owed a wakeup. Which thread is
//! owed is not recorded here: each waiter carries the ID in its TCB
//! (`blocked_on`), and `signal` resolves the wakeup by scanning the alive
//! ring forward from the thread after the running one. Wakeups therefore
//! follow ring order, not arrival order.
//!
//! The table holds the application semaphores first, then two per FIFO
//! channel (mutex and occupancy).

use crate::config::{MAX_FIFOS, MAX_SEMAPHORES};
use crate::scheduler::Scheduler;
use crate::thread::ThreadId;

/// Total counters: application semaphores plus the FIFO channels' own.
pub const SEMAPHORE_POOL: usize = MAX_SEMAPHORES + 2 * MAX_FIFOS;

/// Stable handle of a semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreId(u8);

impl SemaphoreId {
    /// Handle of application semaphore `index`, for `const` declarations.
    ///
    /// # Panics
    /// If `index >= MAX_SEMAPHORES`. In a `const` item this is a build
    /// error; use [`SemaphoreId::try_new`] for indices computed at run time.
    pub const fn new(index: usize) -> Self {
        match Self::try_new(index) {
            Some(sem) => sem,
            None => panic!("semaphore index out of range"),
        }
    }

    /// Handle of application semaphore `index`, `None` if out of range.
    pub const fn try_new(index: usize) -> Option<Self> {
        if index < MAX_SEMAPHORES {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    pub(crate) const fn fifo_mutex(channel: usize) -> Self {
        Self((MAX_SEMAPHORES + 2 * channel) as u8)
    }

    pub(crate) const fn fifo_occupancy(channel: usize) -> Self {
        Self((MAX_SEMAPHORES + 2 * channel + 1) as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Result of a `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A unit was available and has been taken.
    Acquired,
    /// The calling thread is now blocked and a switch has been requested.
    /// It resumes holding the unit once a `signal` picks it.
    Blocked,
}

/// Counters of every semaphore in the system.
pub struct SemaphoreTable {
    counts: [i32; SEMAPHORE_POOL],
}

impl SemaphoreTable {
    pub const fn new() -> Self {
        Self {
            counts: [0; SEMAPHORE_POOL],
        }
    }

    pub fn reset(&mut self) {
        self.counts = [0; SEMAPHORE_POOL];
    }

    pub fn init(&mut self, sem: SemaphoreId, value: i32) {
        self.counts[sem.index()] = value;
    }

    #[inline]
    pub fn count(&self, sem: SemaphoreId) -> i32 {
        self.counts[sem.index()]
    }

    /// Take one unit, blocking the running thread if none is left.
    pub fn wait(&mut self, sem: SemaphoreId, scheduler: &mut Scheduler) -> WaitOutcome {
        let count = &mut self.counts[sem.index()];
        *count -= 1;
        if *count >= 0 {
            return WaitOutcome::Acquired;
        }

        scheduler.block_current(sem);
        WaitOutcome::Blocked
    }

    /// Return one unit, handing it to the first waiter in ring order if any
    /// thread is owed one. Returns the woken thread.
    pub fn signal(&mut self, sem: SemaphoreId, scheduler: &mut Scheduler) -> Option<ThreadId> {
        let count = &mut self.counts[sem.index()];
        *count += 1;
        if *count > 0 {
            return None;
        }

        let woken = scheduler.unblock_first(sem);
        if woken.is_none() {
            log::warn!("semaphore {} owes a wakeup but has no waiter", sem.index());
        }
        woken
    }

    /// Cancel the debt of a waiter that disappeared (killed while blocked).
    /// Nobody else is woken: the unit it was owed simply stops being owed.
    pub fn withdraw(&mut self, sem: SemaphoreId) {
        self.counts[sem.index()] += 1;
    }
}
