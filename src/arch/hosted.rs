//! # Hosted Port
//!
//! Stand-in port for non-embedded builds (unit tests, simulation on a
//! workstation). There is no second stack to switch to, so a context-switch
//! request is only counted; whoever drives the kernel calls
//! `Kernel::schedule` itself.

use core::sync::atomic::{AtomicU32, Ordering};

use super::{InterruptController, InterruptHandler};

static SWITCH_REQUESTS: AtomicU32 = AtomicU32::new(0);

/// Nothing to set up on a host.
pub fn init() {}

/// Record a context-switch request.
#[inline]
pub fn request_context_switch() {
    SWITCH_REQUESTS.fetch_add(1, Ordering::Relaxed);
}

/// Context-switch requests since start-up.
pub fn switch_requests() -> u32 {
    SWITCH_REQUESTS.load(Ordering::Relaxed)
}

#[inline]
pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}

/// Interrupt controller with no hardware behind it.
pub struct HostedInterrupts;

impl InterruptController for HostedInterrupts {
    fn register(&mut self, vector: u32, _handler: InterruptHandler) {
        log::debug!("hosted: handler registered on vector {vector}");
    }

    fn set_priority(&mut self, vector: u32, priority: u8) {
        log::debug!("hosted: vector {vector} priority {priority}");
    }

    fn enable(&mut self, vector: u32) {
        log::debug!("hosted: vector {vector} enabled");
    }
}
