//! # Scheduler
//!
//! Owns the fixed thread pool, the circular alive ring, the periodic-event
//! list and the logical clock.
//!
//! ## Alive ring
//!
//! Alive TCBs are chained through `next` / `previous` slot indices into a
//! circular doubly-linked list that always follows slot-index order. A killed
//! slot is unlinked and left in place as a tombstone; `add_thread` reuses the
//! lowest tombstone first and splices it back between its nearest alive
//! neighbours, so index order survives any sequence of kills and reuses.
//!
//! ## Selection
//!
//! Starting just after the running thread, every other alive thread is
//! visited once. Threads that are asleep or blocked are skipped; among the
//! rest the numerically lowest priority wins, ties going to the first one
//! met. The running thread is only a fallback when no other thread is
//! eligible, so threads sharing the best priority rotate. The idle thread
//! (priority 255, never sleeps, never blocks) guarantees a candidate.
//!
//! ## Tick
//!
//! At each SysTick interrupt:
//! 1. Advance the tick counter
//! 2. Wake every sleeper whose `wake_tick` has been reached
//! 3. Collect the periodic events that are due
//! 4. Request a context switch (taken by PendSV once the tick returns)

use crate::config::{
    FIRST_IRQ_VECTOR, HW_PRIORITY_LEVELS, LAST_IRQ_VECTOR, MAX_PTHREADS, MAX_THREADS,
};
use crate::error::SchedError;
use crate::periodic::{DueEvents, EventHandler, PeriodicEvent};
use crate::semaphore::SemaphoreId;
use crate::thread::{ThreadControlBlock, ThreadEntry, ThreadId, ThreadName, ThreadState};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Scheduling state of the whole system.
pub struct Scheduler {
    /// Fixed pool of TCBs, alive and dead.
    pub threads: [ThreadControlBlock; MAX_THREADS],

    /// Slot of the running thread. Once that thread is killed the slot no
    /// longer identifies it (it may even be reused) until the next switch.
    pub current: usize,

    /// ID of the running thread if it was killed before being switched out.
    vacated: Option<ThreadId>,

    /// Number of alive threads.
    pub thread_count: usize,

    /// Slots `0..high_water` have been used at least once.
    high_water: usize,

    /// ID handed to the next thread.
    next_id: u32,

    /// Periodic events, circularly linked in registration order.
    pub events: [PeriodicEvent; MAX_PTHREADS],
    pub event_count: usize,

    /// Monotonic tick counter.
    pub tick_count: u64,

    /// Set whenever a context switch should be taken.
    pub needs_reschedule: bool,

    launched: bool,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            threads: [ThreadControlBlock::EMPTY; MAX_THREADS],
            current: 0,
            vacated: None,
            thread_count: 0,
            high_water: 0,
            next_id: 0,
            events: [PeriodicEvent::EMPTY; MAX_PTHREADS],
            event_count: 0,
            tick_count: 0,
            needs_reschedule: false,
            launched: false,
        }
    }

    /// Return to the power-on state in place. Stacks are left as they are;
    /// they are rebuilt when a slot is handed out.
    pub fn reset(&mut self) {
        for tcb in self.threads.iter_mut() {
            tcb.alive = false;
            tcb.asleep = false;
            tcb.blocked_on = None;
        }
        self.events = [PeriodicEvent::EMPTY; MAX_PTHREADS];
        self.current = 0;
        self.vacated = None;
        self.thread_count = 0;
        self.high_water = 0;
        self.next_id = 0;
        self.event_count = 0;
        self.tick_count = 0;
        self.needs_reschedule = false;
        self.launched = false;
    }

    // -----------------------------------------------------------------------
    // Thread lifecycle
    // -----------------------------------------------------------------------

    /// Create a thread in the lowest free slot.
    ///
    /// # Returns
    /// - `Ok(id)` — the new thread's ID
    /// - `Err(ThreadLimitReached)` — every slot is alive; nothing was changed
    pub fn add_thread(
        &mut self,
        entry: ThreadEntry,
        priority: u8,
        name: &str,
    ) -> Result<ThreadId, SchedError> {
        if self.thread_count >= MAX_THREADS {
            log::warn!("add_thread({name}): thread limit reached");
            return Err(SchedError::ThreadLimitReached);
        }

        let slot = (0..self.high_water)
            .find(|&i| !self.threads[i].alive)
            .unwrap_or(self.high_water);

        let id = ThreadId(self.next_id);
        self.next_id += 1;

        self.threads[slot].init(id, entry, crate::kernel::thread_exit, priority, name);
        self.link(slot);

        if slot == self.high_water {
            self.high_water += 1;
        }
        self.thread_count += 1;

        log::debug!("thread {id} '{name}' added in slot {slot}, priority {priority}");
        Ok(id)
    }

    /// Kill the alive thread `id`.
    ///
    /// # Returns
    /// - `Ok(Some(sem))` — killed; it was waiting on `sem`, whose debt the
    ///   caller must withdraw
    /// - `Ok(None)` — killed
    /// - `Err(CannotKillLastThread)` — it is the only alive thread
    /// - `Err(ThreadNotFound)` — no alive thread has this ID
    pub fn kill_thread(&mut self, id: ThreadId) -> Result<Option<SemaphoreId>, SchedError> {
        if self.thread_count <= 1 {
            return Err(SchedError::CannotKillLastThread);
        }
        let slot = self.slot_of(id).ok_or(SchedError::ThreadNotFound)?;

        self.unlink(slot);
        let tcb = &mut self.threads[slot];
        tcb.alive = false;
        tcb.asleep = false;
        let blocked_on = tcb.blocked_on.take();
        self.thread_count -= 1;

        if slot == self.current && self.vacated.is_none() {
            self.vacated = Some(id);
            self.needs_reschedule = true;
        }

        log::debug!("thread {id} killed (slot {slot}), {} left", self.thread_count);
        Ok(blocked_on)
    }

    /// Kill the running thread.
    pub fn kill_self(&mut self) -> Result<Option<SemaphoreId>, SchedError> {
        let slot = self.running_slot().ok_or(SchedError::ThreadNotFound)?;
        let id = self.threads[slot].id;
        self.kill_thread(id)
    }

    /// Put the running thread to sleep for `ticks` ticks.
    pub fn sleep(&mut self, ticks: u32) {
        let now = self.tick_count;
        let tcb = &mut self.threads[self.current];
        tcb.wake_tick = now + u64::from(ticks);
        tcb.asleep = true;
        self.needs_reschedule = true;
    }

    /// Mark the running thread as waiting on `sem` and request a switch.
    pub fn block_current(&mut self, sem: SemaphoreId) {
        self.threads[self.current].blocked_on = Some(sem);
        self.needs_reschedule = true;
    }

    /// Clear the block of the first thread waiting on `sem`, scanning the
    /// ring from the thread after the running one (the running one last).
    pub fn unblock_first(&mut self, sem: SemaphoreId) -> Option<ThreadId> {
        let mut slot = self.ring_start()?;
        for _ in 0..self.thread_count {
            let tcb = &mut self.threads[slot];
            if tcb.blocked_on == Some(sem) {
                tcb.blocked_on = None;
                log::trace!("thread {} unblocked", tcb.id);
                return Some(tcb.id);
            }
            slot = tcb.next;
        }
        None
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Append a periodic event to the event list.
    pub fn add_periodic_event(
        &mut self,
        handler: EventHandler,
        period: u32,
        execute_time: u64,
    ) -> Result<(), SchedError> {
        if self.event_count >= MAX_PTHREADS {
            log::warn!("add_periodic_event: periodic event limit reached");
            return Err(SchedError::ThreadLimitReached);
        }

        let n = self.event_count;
        self.events[n].init(handler, period, execute_time);
        if n == 0 {
            self.events[0].next = 0;
            self.events[0].previous = 0;
        } else {
            self.events[n].next = 0;
            self.events[n].previous = n - 1;
            self.events[n - 1].next = n;
            self.events[0].previous = n;
        }
        self.event_count += 1;

        log::debug!("periodic event {n} added: period {period}, first at {execute_time}");
        Ok(())
    }

    /// Check an aperiodic event's vector index and hardware priority.
    pub fn validate_aperiodic(priority: u8, vector: u32) -> Result<(), SchedError> {
        if !(FIRST_IRQ_VECTOR..=LAST_IRQ_VECTOR).contains(&vector) {
            log::warn!("aperiodic event: vector {vector} out of range");
            return Err(SchedError::InvalidInterruptNumber);
        }
        if priority >= HW_PRIORITY_LEVELS {
            log::warn!("aperiodic event: priority {priority} out of range");
            return Err(SchedError::InvalidHardwarePriority);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tick and selection
    // -----------------------------------------------------------------------

    /// Called from the SysTick handler every tick.
    ///
    /// Wakes due sleepers, collects due periodic events and requests a
    /// switch. The returned handlers must be fired by the caller once the
    /// kernel is no longer borrowed.
    pub fn tick(&mut self) -> DueEvents {
        self.tick_count += 1;
        let now = self.tick_count;

        // --- Wake sleepers ---
        if let Some(mut slot) = self.ring_start() {
            for _ in 0..self.thread_count {
                let tcb = &mut self.threads[slot];
                if tcb.asleep && tcb.wake_tick <= now {
                    tcb.asleep = false;
                    log::trace!("thread {} woke at tick {now}", tcb.id);
                }
                slot = tcb.next;
            }
        }

        // --- Periodic events ---
        let mut due = DueEvents::new();
        let mut event = 0;
        for _ in 0..self.event_count {
            let ptcb = &mut self.events[event];
            if ptcb.advance(now) {
                if let Some(handler) = ptcb.handler {
                    due.push(handler);
                }
            }
            event = ptcb.next;
        }

        self.needs_reschedule = true;
        due
    }

    /// Pick the thread to run next without switching to it.
    ///
    /// # Returns
    /// Slot index of the selected thread.
    pub fn select_next(&self) -> usize {
        let Some(start) = self.ring_start() else {
            return self.current;
        };

        let running = self.running_slot();
        let mut selected: Option<usize> = None;
        let mut slot = start;
        for _ in 0..self.thread_count {
            let tcb = &self.threads[slot];
            if Some(slot) != running && tcb.is_eligible() {
                let better = match selected {
                    Some(best) => tcb.priority < self.threads[best].priority,
                    None => true,
                };
                if better {
                    selected = Some(slot);
                }
            }
            slot = tcb.next;
        }

        match selected {
            Some(slot) => slot,
            None if running.is_some_and(|r| self.threads[r].is_eligible()) => self.current,
            // Nothing eligible at all; keep to alive threads regardless.
            None => start,
        }
    }

    /// Select the next thread and make it the running one.
    pub fn schedule(&mut self) -> usize {
        let next = self.select_next();
        if next != self.current {
            log::trace!("switch {} -> {}", self.threads[self.current].id, self.threads[next].id);
        }
        self.current = next;
        self.vacated = None;
        self.needs_reschedule = false;
        next
    }

    /// Pick the first thread to run: the most eligible one, lowest slot on
    /// ties. `None` if no thread was created.
    pub fn launch(&mut self) -> Option<ThreadId> {
        let mut first: Option<usize> = None;
        for slot in 0..self.high_water {
            let tcb = &self.threads[slot];
            if !tcb.is_eligible() {
                continue;
            }
            match first {
                Some(best) if self.threads[best].priority <= tcb.priority => {}
                _ => first = Some(slot),
            }
        }

        let first = first?;
        self.current = first;
        self.vacated = None;
        self.launched = true;
        self.needs_reschedule = false;
        Some(self.threads[first].id)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_launched(&self) -> bool {
        self.launched
    }

    #[inline]
    pub fn now(&self) -> u64 {
        self.tick_count
    }

    /// ID of the running thread.
    pub fn current_id(&self) -> ThreadId {
        self.vacated.unwrap_or(self.threads[self.current].id)
    }

    /// Slot of the running thread, `None` once it has been killed.
    pub fn running_slot(&self) -> Option<usize> {
        let alive = self.vacated.is_none() && self.threads[self.current].alive;
        alive.then_some(self.current)
    }

    /// Slot of the alive thread `id`.
    pub fn slot_of(&self, id: ThreadId) -> Option<usize> {
        (0..self.high_water).find(|&i| self.threads[i].alive && self.threads[i].id == id)
    }

    pub fn thread_state(&self, id: ThreadId) -> ThreadState {
        let Some(slot) = self.slot_of(id) else {
            return ThreadState::Dead;
        };
        let tcb = &self.threads[slot];
        if tcb.blocked_on.is_some() {
            ThreadState::Blocked
        } else if tcb.asleep {
            ThreadState::Sleeping
        } else if self.launched && Some(slot) == self.running_slot() {
            ThreadState::Running
        } else {
            ThreadState::Ready
        }
    }

    pub fn thread_name(&self, id: ThreadId) -> Option<ThreadName> {
        self.slot_of(id).map(|slot| self.threads[slot].name)
    }

    /// Slots of the alive ring, following `next` from `start` once around.
    pub fn ring_from(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        let mut slot = start;
        (0..self.thread_count).map(move |_| {
            let here = slot;
            slot = self.threads[here].next;
            here
        })
    }

    // -----------------------------------------------------------------------
    // Ring maintenance
    // -----------------------------------------------------------------------

    /// First slot of a scan that starts just after the running thread. If
    /// it was killed, the scan starts at its former successor and any thread
    /// reusing its slot comes last.
    fn ring_start(&self) -> Option<usize> {
        if self.thread_count == 0 {
            return None;
        }
        match self.running_slot() {
            Some(slot) => Some(self.threads[slot].next),
            None => self
                .alive_after(self.current)
                .or_else(|| self.threads[self.current].alive.then_some(self.current)),
        }
    }

    /// Nearest alive slot after `slot` in cyclic index order, `slot` excluded.
    fn alive_after(&self, slot: usize) -> Option<usize> {
        (1..MAX_THREADS)
            .map(|step| (slot + step) % MAX_THREADS)
            .find(|&i| self.threads[i].alive)
    }

    /// Nearest alive slot before `slot` in cyclic index order, `slot` excluded.
    fn alive_before(&self, slot: usize) -> Option<usize> {
        (1..MAX_THREADS)
            .map(|step| (slot + MAX_THREADS - step) % MAX_THREADS)
            .find(|&i| self.threads[i].alive)
    }

    /// Splice the freshly initialized `slot` between its alive neighbours.
    fn link(&mut self, slot: usize) {
        match (self.alive_after(slot), self.alive_before(slot)) {
            (Some(next), Some(previous)) => {
                self.threads[slot].next = next;
                self.threads[slot].previous = previous;
                self.threads[previous].next = slot;
                self.threads[next].previous = slot;
            }
            _ => {
                self.threads[slot].next = slot;
                self.threads[slot].previous = slot;
            }
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (next, previous) = (self.threads[slot].next, self.threads[slot].previous);
        self.threads[previous].next = next;
        self.threads[next].previous = previous;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
