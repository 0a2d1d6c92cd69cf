//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick timer configuration,
//! and NVIC access for aperiodic events.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by threads in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xE0 (level 7, lowest with 3 priority bits)
//! - PendSV: 0xE0, so a switch never nests inside another handler
//! - Aperiodic events: levels 0..=6

use core::arch::{asm, naked_asm};
use core::ptr::addr_of_mut;

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{NVIC, SCB, SYST};

use super::{InterruptController, InterruptHandler};
use crate::config::{
    FIRST_IRQ_VECTOR, KERNEL_EXCEPTION_PRIORITY, LAST_IRQ_VECTOR, NVIC_PRIO_BITS,
    SYSTEM_CLOCK_HZ, TICK_HZ,
};

// ---------------------------------------------------------------------------
// Platform bring-up
// ---------------------------------------------------------------------------

const VECTOR_COUNT: usize = LAST_IRQ_VECTOR as usize + 1;

/// RAM copy of the vector table. VTOR needs the table aligned to its size
/// rounded up to a power of two.
#[repr(C, align(1024))]
struct VectorTable([usize; VECTOR_COUNT]);

static mut RAM_VECTORS: VectorTable = VectorTable([0; VECTOR_COUNT]);

extern "C" {
    /// Start of the flash vector table, placed by `cortex-m-rt`'s linker script.
    static __vector_table: usize;
}

/// Copy the flash vector table to RAM and point VTOR at the copy, so
/// aperiodic handlers can be installed at run time.
pub fn init() {
    cortex_m::interrupt::free(|_| unsafe {
        let flash = core::ptr::addr_of!(__vector_table);
        let ram = addr_of_mut!(RAM_VECTORS.0) as *mut usize;
        for i in 0..VECTOR_COUNT {
            ram.add(i).write_volatile(flash.add(i).read_volatile());
        }
        (*SCB::PTR).vtor.write(ram as u32);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    });
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put PendSV and SysTick at the kernel level, below every aperiodic event.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(SystemHandler::PendSV, KERNEL_EXCEPTION_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, KERNEL_EXCEPTION_PRIORITY);
    }
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend PendSV. The switch is taken as soon as no critical section or
/// higher-priority handler is active.
#[inline]
pub fn request_context_switch() {
    SCB::set_pendsv();
}

#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

// ---------------------------------------------------------------------------
// First thread launch
// ---------------------------------------------------------------------------

/// Start the first thread by switching to PSP and branching to its entry.
///
/// `sp` points at the thread's saved context (software frame first). The
/// hardware frame is popped by hand since no exception is being returned
/// from; LR gets the thread-exit trap stored in the frame.
///
/// # Safety
/// Must only be called once, with interrupts disabled and `sp` pointing at
/// a context built by `ThreadControlBlock::init`.
pub unsafe fn start_first_thread(sp: *const u32) -> ! {
    asm!(
        "adds r0, #32",        // skip R4-R11
        "msr psp, r0",

        // Thread mode runs on PSP from here on
        "movs r0, #2",
        "msr control, r0",
        "isb",

        "pop {{r0-r3, r12, lr}}",
        "pop {{r4, r5}}",      // PC, xPSR (xPSR discarded)
        "orr r4, r4, #1",      // stay in Thumb state
        "cpsie i",
        "bx r4",

        in("r0") sp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler — performs the actual context switch.
///
/// ## Sequence
/// 1. Save R4–R11 onto the outgoing thread's stack (PSP)
/// 2. Hand the resulting PSP to the kernel, which records it and selects
///    the next thread
/// 3. Restore R4–R11 from the incoming thread's stack
/// 4. Return from exception (hardware restores R0–R3, R12, LR, PC, xPSR)
///
/// # Safety
/// Entered only by the exception mechanism.
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",             // r0 = incoming context
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "cpsie i",
        // Thread mode, PSP
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        switch = sym switch_context,
    );
}

extern "C" fn switch_context(psp: *mut u32) -> *mut u32 {
    crate::kernel::context_switch(psp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler — scheduler tick entry point.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::tick_handler();
}

// ---------------------------------------------------------------------------
// NVIC
// ---------------------------------------------------------------------------

/// Device interrupt line, numbered from the first IRQ vector.
#[derive(Clone, Copy)]
struct Irq(u16);

unsafe impl InterruptNumber for Irq {
    fn number(self) -> u16 {
        self.0
    }
}

impl Irq {
    fn from_vector(vector: u32) -> Self {
        Irq((vector - FIRST_IRQ_VECTOR) as u16)
    }
}

/// NVIC plus the RAM vector table set up by [`init`].
pub struct Nvic;

impl InterruptController for Nvic {
    fn register(&mut self, vector: u32, handler: InterruptHandler) {
        unsafe {
            let table = (*SCB::PTR).vtor.read() as *mut usize;
            table.add(vector as usize).write_volatile(handler as usize);
        }
        cortex_m::asm::dsb();
    }

    fn set_priority(&mut self, vector: u32, priority: u8) {
        let irq = Irq::from_vector(vector);
        unsafe {
            (*NVIC::PTR).ipr[irq.0 as usize].write(priority << (8 - NVIC_PRIO_BITS));
        }
    }

    fn enable(&mut self, vector: u32) {
        unsafe { NVIC::unmask(Irq::from_vector(vector)) }
    }
}
