//! # Architecture Abstraction Layer
//!
//! Provides a hardware abstraction boundary for the kernel. The Cortex-M4
//! port is selected for bare-metal ARM builds; any other target gets the
//! hosted port, where context-switch requests are only counted.
//!
//! Each port exports the same four items:
//! - `init()` — one-time platform setup done by `kernel::init`
//! - `request_context_switch()` — pend the context-switch trap
//! - `wait_for_interrupt()` — idle the core until something happens
//! - `PlatformInterrupts` — the [`InterruptController`] aperiodic events use

/// Handler bound directly to an interrupt vector.
pub type InterruptHandler = extern "C" fn();

/// Interrupt controller operations needed to install an aperiodic event.
///
/// `vector` is the vector-table index (16 = first device interrupt),
/// `priority` the logical hardware level, 0 being the most urgent.
pub trait InterruptController {
    fn register(&mut self, vector: u32, handler: InterruptHandler);
    fn set_priority(&mut self, vector: u32, priority: u8);
    fn enable(&mut self, vector: u32);
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cortex_m4::{init, request_context_switch, wait_for_interrupt, Nvic as PlatformInterrupts};

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub mod hosted;
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use hosted::{init, request_context_switch, wait_for_interrupt, HostedInterrupts as PlatformInterrupts};
