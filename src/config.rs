//! # Kestrel Configuration
//!
//! Compile-time constants governing the kernel's fixed pools and timing.
//! All limits are fixed at compile time — no dynamic allocation, no
//! runtime resizing.

/// Maximum number of threads alive at the same time, idle thread included.
/// Each slot owns `STACK_WORDS` words of stack whether it is alive or not.
pub const MAX_THREADS: usize = 8;

/// Maximum number of periodic events. Periodic events are never removed.
pub const MAX_PTHREADS: usize = 6;

/// Per-thread stack size in 32-bit words. Must hold the deepest call chain
/// plus the 16-word exception frame (8 hardware-stacked + 8 software-saved).
pub const STACK_WORDS: usize = 512;

/// Capacity of a thread name in bytes. Longer names are truncated.
pub const MAX_NAME_LENGTH: usize = 16;

/// Number of application semaphores (`SemaphoreId::new(0..MAX_SEMAPHORES)`).
/// FIFO channels carry their own semaphores on top of these.
pub const MAX_SEMAPHORES: usize = 16;

/// Number of FIFO channels.
pub const MAX_FIFOS: usize = 4;

/// Capacity of each FIFO channel, in 32-bit elements.
pub const FIFO_SIZE: usize = 16;

/// SysTick frequency in Hz. One tick is the unit of `sleep` and of
/// periodic-event periods.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (TM4C123 at 16 MHz PIOSC).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// First vector-table index usable by an aperiodic event. Indices below are
/// the processor's system exceptions.
pub const FIRST_IRQ_VECTOR: u32 = 16;

/// Last vector-table index implemented by the device.
pub const LAST_IRQ_VECTOR: u32 = 155;

/// Number of hardware priority levels an aperiodic event may use (0..=6).
/// Level 7, the lowest, is reserved for SysTick and PendSV so that a
/// context switch never nests inside an application interrupt.
pub const HW_PRIORITY_LEVELS: u8 = 7;

/// Number of implemented priority bits in the NVIC priority registers.
pub const NVIC_PRIO_BITS: u8 = 3;

/// Raw priority byte written for the kernel's own exceptions (level 7).
pub const KERNEL_EXCEPTION_PRIORITY: u8 = 0xE0;
