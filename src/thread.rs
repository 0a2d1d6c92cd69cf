//! # Thread Control Block
//!
//! Defines the per-thread record the scheduler keeps in its fixed pool.
//! A slot is either alive (linked into the scheduler's circular alive ring)
//! or dead (free for reuse). Its stack belongs to the slot, not to the thread:
//! a reused slot has its register image rebuilt in place.

use core::fmt;
use core::ops::{Deref, DerefMut};

use arrayvec::ArrayString;

use crate::config::{MAX_NAME_LENGTH, STACK_WORDS};
use crate::semaphore::SemaphoreId;

/// Thread entry point. Threads never return; one that does falls into the
/// kernel's exit trap and is killed.
pub type ThreadEntry = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Identity and state
// ---------------------------------------------------------------------------

/// Stable thread identifier, assigned sequentially at creation and never
/// reused, even when the slot is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling state of a thread.
///
/// ```text
///            select              sleep(ms)
///   Ready ──────────► Running ──────────────► Sleeping
///     ▲  ◄──────────     │  wait (count < 0)     │
///     │    preempt       └──────────► Blocked    │
///     │                                  │       │
///     └────── signal ────────────────────┘       │
///     └────── tick (now >= wake_tick) ───────────┘
///
///   any alive state ── kill ──► Dead
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Sleeping,
    Blocked,
    Dead,
}

/// Fixed-capacity thread name.
pub type ThreadName = ArrayString<MAX_NAME_LENGTH>;

/// Copy `name`, truncating on a character boundary if it does not fit.
pub fn truncate_name(name: &str) -> ThreadName {
    let mut len = name.len().min(MAX_NAME_LENGTH);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    let mut out = ThreadName::new_const();
    // `len` is within capacity.
    let _ = out.try_push_str(&name[..len]);
    out
}

/// Stack storage of one slot. AAPCS requires an 8-byte aligned SP at every
/// public interface, starting with the thread entry.
#[repr(C, align(8))]
pub struct Stack(pub [u32; STACK_WORDS]);

impl Deref for Stack {
    type Target = [u32; STACK_WORDS];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Stack {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

// ---------------------------------------------------------------------------
// Initial register image
// ---------------------------------------------------------------------------

/// Words in a full saved context: 8 software-saved (R4–R11) followed by the
/// 8-word hardware exception frame (R0–R3, R12, LR, PC, xPSR).
pub const CONTEXT_WORDS: usize = 16;

/// Thumb state bit of xPSR. Must be set or the first return faults.
pub const XPSR_THUMB: u32 = 0x0100_0000;

/// Word offsets inside the saved context, relative to the saved stack pointer.
pub mod frame {
    pub const R4: usize = 0;
    pub const R11: usize = 7;
    pub const R0: usize = 8;
    pub const R12: usize = 12;
    pub const LR: usize = 13;
    pub const PC: usize = 14;
    pub const XPSR: usize = 15;
}

// ---------------------------------------------------------------------------
// Thread Control Block
// ---------------------------------------------------------------------------

/// Thread Control Block (TCB).
///
/// `next` / `previous` are slot indices into the scheduler's pool and are only
/// meaningful while the slot is alive. `saved_sp` is a word offset into
/// `stack` rather than an address, so the record stays valid wherever the
/// kernel value lives; the port converts it on every switch.
pub struct ThreadControlBlock {
    /// Register image and call stack of the thread owning this slot.
    pub stack: Stack,
    /// Word offset of the saved stack pointer within `stack`.
    pub saved_sp: usize,

    pub next: usize,
    pub previous: usize,

    /// 0 is the most eligible, 255 the least.
    pub priority: u8,
    pub id: ThreadId,
    pub name: ThreadName,

    pub alive: bool,
    pub asleep: bool,
    /// Absolute tick at which `asleep` is cleared.
    pub wake_tick: u64,
    /// Semaphore this thread is waiting on, if any.
    pub blocked_on: Option<SemaphoreId>,
}

impl ThreadControlBlock {
    /// A dead, never-used slot. Used to initialize the static pool.
    pub const EMPTY: Self = Self {
        stack: Stack([0; STACK_WORDS]),
        saved_sp: STACK_WORDS,
        next: 0,
        previous: 0,
        priority: u8::MAX,
        id: ThreadId(0),
        name: ThreadName::new_const(),
        alive: false,
        asleep: false,
        wake_tick: 0,
        blocked_on: None,
    };

    /// Bring the slot to life for a new thread. Links are set by the caller.
    pub fn init(
        &mut self,
        id: ThreadId,
        entry: ThreadEntry,
        exit: ThreadEntry,
        priority: u8,
        name: &str,
    ) {
        self.id = id;
        self.priority = priority;
        self.name = truncate_name(name);
        self.alive = true;
        self.asleep = false;
        self.wake_tick = 0;
        self.blocked_on = None;
        self.init_stack(entry, exit);
    }

    /// Build the context a first switch-in restores.
    ///
    /// ## Stack Layout (top = high address, growing down)
    ///
    /// ```text
    /// [Hardware stacked frame]
    ///   xPSR  (Thumb bit set)
    ///   PC    (thread entry point)
    ///   LR    (exit trap)
    ///   R12, R3, R2, R1, R0
    /// [Software saved context]
    ///   R11 … R4              <- saved_sp
    /// ```
    ///
    /// Registers other than PC/LR/xPSR hold their own number repeated in each
    /// byte (R5 = 0x0505_0505), which makes a corrupted frame easy to spot.
    fn init_stack(&mut self, entry: ThreadEntry, exit: ThreadEntry) {
        let base = STACK_WORDS - CONTEXT_WORDS;
        let ctx = &mut self.stack[base..];

        for (i, word) in ctx[frame::R4..=frame::R11].iter_mut().enumerate() {
            *word = filler(4 + i as u32);
        }
        for (i, word) in ctx[frame::R0..=frame::R12].iter_mut().enumerate() {
            // R0..R3 then R12
            let reg = if i < 4 { i as u32 } else { 12 };
            *word = filler(reg);
        }
        ctx[frame::LR] = exit as usize as u32;
        // Exception return takes the Thumb state from xPSR, not from PC bit 0.
        ctx[frame::PC] = entry as usize as u32 & !1;
        ctx[frame::XPSR] = XPSR_THUMB;

        self.saved_sp = base;
    }

    /// Not asleep and not waiting on a semaphore.
    #[inline]
    pub fn is_eligible(&self) -> bool {
        self.alive && !self.asleep && self.blocked_on.is_none()
    }

    /// The saved context, starting at `saved_sp`.
    pub fn saved_context(&self) -> &[u32] {
        &self.stack[self.saved_sp..]
    }
}

#[inline]
const fn filler(reg: u32) -> u32 {
    reg * 0x0101_0101
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
