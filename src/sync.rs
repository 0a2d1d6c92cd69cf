//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections for the kernel. Every multi-step edit of
//! kernel state (ring relinking, counter updates, flag changes) happens inside
//! one, so the tick handler, the context-switch trap, aperiodic handlers and
//! threads never observe a half-done mutation.
//!
//! Two forms are provided:
//! - [`enter`] returns a guard that holds the prior interrupt state; dropping
//!   it restores exactly that state, so nested sections never re-enable
//!   interrupts on behalf of an outer one.
//! - [`critical_section`] runs a closure inside a section.
//!
//! On the device the underlying implementation is `cortex-m`'s single-core
//! PRIMASK save/restore; on a hosted build it is `critical-section`'s `std`
//! implementation.

use core::marker::PhantomData;

pub use critical_section::CriticalSection;
use critical_section::RestoreState;

/// An open critical section. Interrupts stay masked until it is dropped.
#[must_use = "the critical section ends as soon as the guard is dropped"]
pub struct CriticalSectionGuard {
    restore: RestoreState,
    /// Sections are tied to the context that opened them.
    _not_send: PhantomData<*mut ()>,
}

impl CriticalSectionGuard {
    /// Token proving the section is open, for `critical_section::Mutex` access.
    #[inline]
    pub fn token(&self) -> CriticalSection<'_> {
        // SAFETY: the section stays open for as long as `self` is borrowed.
        unsafe { CriticalSection::new() }
    }
}

impl Drop for CriticalSectionGuard {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: `restore` came from the matching `acquire` in `enter`, and
        // guards are released in reverse order of creation by scoping.
        unsafe { critical_section::release(self.restore) }
    }
}

/// Mask asynchronous preemption and remember the previous state.
#[inline]
pub fn enter() -> CriticalSectionGuard {
    // SAFETY: released exactly once by the guard's `Drop`.
    let restore = unsafe { critical_section::acquire() };
    CriticalSectionGuard {
        restore,
        _not_send: PhantomData,
    }
}

/// Restore the interrupt state saved by `enter`.
#[inline]
pub fn exit(guard: CriticalSectionGuard) {
    drop(guard);
}

/// Execute a closure within a critical section.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     KERNEL.borrow_ref_mut(cs).signal(sem);
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
