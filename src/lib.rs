//! # Kestrel — a small preemptive RTOS kernel
//!
//! Priority scheduling, counting semaphores and word FIFOs for ARM
//! Cortex-M4 microcontrollers.
//!
//! ## Overview
//!
//! A fixed pool of threads is scheduled by numeric priority (0 is the most
//! urgent, 255 the least). Threads sharing the best priority present take
//! turns, one per tick. Time is a tick counter driven by SysTick; register
//! save/restore is deferred to PendSV so it always runs at the lowest
//! exception level. Beside threads, the kernel runs two kinds of events:
//!
//! - **Periodic events**: plain handlers called from the tick at a fixed period
//! - **Aperiodic events**: handlers bound straight to an interrupt vector
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │             Application Threads / Handlers              │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init · launch · add_thread · sleep · wait · signal   │
//! │   add_periodic_event · read_fifo · write_fifo · …      │
//! ├──────────────┬───────────────┬─────────────┬───────────┤
//! │  Scheduler   │  Semaphores   │  FIFOs      │  Sync     │
//! │  scheduler.rs│  semaphore.rs │  fifo.rs    │  sync.rs  │
//! │  ─ tick()    │  ─ wait()     │  ─ init()   │  ─ enter()│
//! │  ─ schedule()│  ─ signal()   │  ─ read()   │  ─ exit() │
//! │  ─ sleep()   │  ─ withdraw() │  ─ write()  │           │
//! ├──────────────┴───────────────┴─────────────┴───────────┤
//! │          Thread / Event Model (thread.rs, periodic.rs)  │
//! │          TCB · ThreadId · PeriodicEvent · DueEvents     │
//! ├────────────────────────────────────────────────────────┤
//! │   Arch Port (arch/cortex_m4.rs, arch/hosted.rs)         │
//! │   PendSV · SysTick · NVIC · RAM vector table           │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only
//! - **Fixed-size pools**: `[ThreadControlBlock; MAX_THREADS]`,
//!   `[PeriodicEvent; MAX_PTHREADS]`, one counter per semaphore
//! - **Per-thread stack**: `[u32; STACK_WORDS]` inline in the TCB
//! - **Critical sections**: the `critical-section` crate guards every
//!   kernel-state edit
//!
//! Everything except `arch::cortex_m4` is plain data and runs on the host,
//! which is where the unit tests execute.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod error;
pub mod fifo;
pub mod kernel;
pub mod periodic;
pub mod scheduler;
pub mod semaphore;
pub mod sync;
pub mod thread;

pub use error::{FifoError, SchedError};
pub use kernel::Kernel;
pub use semaphore::SemaphoreId;
pub use thread::{ThreadId, ThreadState};
