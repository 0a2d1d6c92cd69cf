//! # Periodic Events
//!
//! A periodic event is a plain handler the tick fires on a fixed schedule.
//! It has no stack and no thread state; it runs in the tick's context, right
//! after the kernel state has been updated and before the pending context
//! switch is taken. Events are registered once and live forever.

use arrayvec::ArrayVec;

use crate::config::MAX_PTHREADS;

/// Handler of a periodic event.
pub type EventHandler = fn();

/// Periodic event control block (PTCB).
#[derive(Clone, Copy)]
pub struct PeriodicEvent {
    pub handler: Option<EventHandler>,
    /// Ticks between two firings. A period of 0 fires on every tick.
    pub period: u32,
    /// Absolute tick of the first firing.
    pub execute_time: u64,
    /// Ticks elapsed since the last firing.
    pub current_time: u32,
    /// Whether the first firing has happened.
    pub started: bool,

    pub next: usize,
    pub previous: usize,
}

impl PeriodicEvent {
    pub const EMPTY: Self = Self {
        handler: None,
        period: 0,
        execute_time: 0,
        current_time: 0,
        started: false,
        next: 0,
        previous: 0,
    };

    pub fn init(&mut self, handler: EventHandler, period: u32, execute_time: u64) {
        self.handler = Some(handler);
        self.period = period;
        self.execute_time = execute_time;
        self.current_time = 0;
        self.started = false;
    }

    /// Account for one tick at time `now`; true if the event is due.
    ///
    /// The first firing happens on the first tick with `now >= execute_time`,
    /// every following one `period` ticks after the previous.
    pub fn advance(&mut self, now: u64) -> bool {
        if !self.started {
            if now < self.execute_time {
                return false;
            }
            self.started = true;
            self.current_time = 0;
            return true;
        }

        self.current_time += 1;
        if self.current_time >= self.period.max(1) {
            self.current_time = 0;
            true
        } else {
            false
        }
    }
}

/// Handlers found due by one tick, to be run once the kernel is released.
pub struct DueEvents {
    handlers: ArrayVec<EventHandler, MAX_PTHREADS>,
}

impl DueEvents {
    pub const fn new() -> Self {
        Self {
            handlers: ArrayVec::new_const(),
        }
    }

    /// Each registered event is pushed at most once per tick, so the list
    /// cannot overflow.
    pub fn push(&mut self, handler: EventHandler) {
        if self.handlers.try_push(handler).is_err() {
            log::warn!("more due events than periodic slots");
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every collected handler in list order.
    pub fn fire(self) {
        for handler in self.handlers {
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop() {}

    fn firing_ticks(period: u32, execute_time: u64, until: u64) -> Vec<u64> {
        let mut event = PeriodicEvent::EMPTY;
        event.init(nop, period, execute_time);
        (1..=until).filter(|&now| event.advance(now)).collect()
    }

    #[test]
    fn test_first_fire_then_period() {
        assert_eq!(firing_ticks(50, 9, 120), vec![9, 59, 109]);
    }

    #[test]
    fn test_past_execute_time_fires_on_first_tick() {
        assert_eq!(firing_ticks(3, 0, 10), vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_zero_period_fires_every_tick() {
        assert_eq!(firing_ticks(0, 2, 5), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_due_events_capacity() {
        let mut due = DueEvents::new();
        assert!(due.is_empty());
        for _ in 0..MAX_PTHREADS + 2 {
            due.push(nop);
        }
        assert_eq!(due.len(), MAX_PTHREADS);
        due.fire();
    }
}
