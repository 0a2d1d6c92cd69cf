//! # Kernel
//!
//! The kernel-context value and the public API threads and handlers call.
//!
//! [`Kernel`] bundles the scheduler, the semaphore table and the FIFO
//! channels. It is plain data, so it can be built and driven directly (the
//! host tests do). The firmware uses the single global instance behind the
//! free functions of this module; each of them borrows it inside one
//! critical section and pends a context switch only after the borrow ends.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()             ← Reset state, relocate vectors
//!         ├─► kernel::add_thread()       ← Register threads (×N)
//!         ├─► kernel::add_periodic_event()
//!         ├─► kernel::add_aperiodic_event()
//!         └─► kernel::launch()           ← No return
//!               ├─► Select the first thread
//!               ├─► Set SysTick / PendSV priorities
//!               ├─► Configure SysTick
//!               └─► arch::start_first_thread()
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use crate::arch::{self, InterruptController, InterruptHandler, PlatformInterrupts};
use crate::error::{FifoError, SchedError};
use crate::fifo::FifoTable;
use crate::periodic::{DueEvents, EventHandler};
use crate::scheduler::Scheduler;
use crate::semaphore::{SemaphoreId, SemaphoreTable, WaitOutcome};
use crate::sync;
use crate::thread::{ThreadEntry, ThreadId, ThreadName, ThreadState};

// ---------------------------------------------------------------------------
// Kernel context
// ---------------------------------------------------------------------------

/// All kernel state.
pub struct Kernel {
    pub scheduler: Scheduler,
    pub semaphores: SemaphoreTable,
    pub fifos: FifoTable,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            semaphores: SemaphoreTable::new(),
            fifos: FifoTable::new(),
        }
    }

    /// Back to the power-on state, in place.
    pub fn reset(&mut self) {
        self.scheduler.reset();
        self.semaphores.reset();
        self.fifos = FifoTable::new();
    }

    // -----------------------------------------------------------------------
    // Threads
    // -----------------------------------------------------------------------

    pub fn add_thread(
        &mut self,
        entry: ThreadEntry,
        priority: u8,
        name: &str,
    ) -> Result<ThreadId, SchedError> {
        self.scheduler.add_thread(entry, priority, name)
    }

    /// Kill thread `id`. If it was waiting on a semaphore, the unit it was
    /// owed is withdrawn so the counter matches the remaining waiters.
    pub fn kill_thread(&mut self, id: ThreadId) -> Result<(), SchedError> {
        if let Some(sem) = self.scheduler.kill_thread(id)? {
            self.semaphores.withdraw(sem);
        }
        Ok(())
    }

    pub fn kill_self(&mut self) -> Result<(), SchedError> {
        if let Some(sem) = self.scheduler.kill_self()? {
            self.semaphores.withdraw(sem);
        }
        Ok(())
    }

    pub fn sleep(&mut self, ticks: u32) {
        self.scheduler.sleep(ticks);
    }

    /// Give up the rest of the time slice.
    pub fn yield_now(&mut self) {
        self.scheduler.needs_reschedule = true;
    }

    pub fn thread_id(&self) -> ThreadId {
        self.scheduler.current_id()
    }

    pub fn number_of_threads(&self) -> usize {
        self.scheduler.thread_count
    }

    pub fn thread_state(&self, id: ThreadId) -> ThreadState {
        self.scheduler.thread_state(id)
    }

    pub fn thread_name(&self, id: ThreadId) -> Option<ThreadName> {
        self.scheduler.thread_name(id)
    }

    pub fn thread_priority(&self, id: ThreadId) -> Option<u8> {
        self.scheduler
            .slot_of(id)
            .map(|slot| self.scheduler.threads[slot].priority)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn add_periodic_event(
        &mut self,
        handler: EventHandler,
        period: u32,
        execute_time: u32,
    ) -> Result<(), SchedError> {
        self.scheduler
            .add_periodic_event(handler, period, u64::from(execute_time))
    }

    /// Bind `handler` to interrupt `vector` at hardware level `priority`.
    /// Nothing reaches the controller unless both are valid.
    pub fn add_aperiodic_event<C: InterruptController>(
        controller: &mut C,
        handler: InterruptHandler,
        priority: u8,
        vector: u32,
    ) -> Result<(), SchedError> {
        Scheduler::validate_aperiodic(priority, vector)?;
        controller.register(vector, handler);
        controller.set_priority(vector, priority);
        controller.enable(vector);
        log::debug!("aperiodic event on vector {vector}, priority {priority}");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Select the first thread. `None` if there is nothing to run.
    pub fn launch(&mut self) -> Option<ThreadId> {
        let first = self.scheduler.launch()?;
        log::debug!("launching with thread {first}, {} alive", self.scheduler.thread_count);
        Some(first)
    }

    pub fn tick(&mut self) -> DueEvents {
        self.scheduler.tick()
    }

    /// Context switch: record where the outgoing thread's context was saved,
    /// select the next thread and return where its context is.
    ///
    /// `outgoing` is ignored if the outgoing thread has been killed since it
    /// was switched in.
    pub fn switch(&mut self, outgoing: *mut u32) -> *mut u32 {
        if let Some(slot) = self.scheduler.running_slot() {
            let tcb = &mut self.scheduler.threads[slot];
            let base = tcb.stack.as_ptr() as usize;
            tcb.saved_sp = (outgoing as usize - base) / core::mem::size_of::<u32>();
        }

        let next = self.scheduler.schedule();
        let tcb = &mut self.scheduler.threads[next];
        tcb.stack[tcb.saved_sp..].as_mut_ptr()
    }

    /// Saved context of the selected thread.
    pub fn current_context(&mut self) -> *mut u32 {
        let tcb = &mut self.scheduler.threads[self.scheduler.current];
        tcb.stack[tcb.saved_sp..].as_mut_ptr()
    }

    /// Consume a pending switch request. Requests made before launch are
    /// dropped; there is no thread context to switch from yet.
    pub fn take_reschedule(&mut self) -> bool {
        core::mem::take(&mut self.scheduler.needs_reschedule) && self.scheduler.is_launched()
    }

    // -----------------------------------------------------------------------
    // Semaphores
    // -----------------------------------------------------------------------

    pub fn init_semaphore(&mut self, sem: SemaphoreId, value: i32) {
        self.semaphores.init(sem, value);
    }

    pub fn wait(&mut self, sem: SemaphoreId) -> WaitOutcome {
        self.semaphores.wait(sem, &mut self.scheduler)
    }

    pub fn signal(&mut self, sem: SemaphoreId) -> Option<ThreadId> {
        self.semaphores.signal(sem, &mut self.scheduler)
    }

    // -----------------------------------------------------------------------
    // FIFO channels
    // -----------------------------------------------------------------------

    pub fn init_fifo(&mut self, channel: usize) -> Result<(), FifoError> {
        self.fifos.init(channel, &mut self.semaphores)
    }

    pub fn fifo_mutex(&self, channel: usize) -> Result<SemaphoreId, FifoError> {
        self.fifos.mutex(channel)
    }

    /// See [`FifoTable::write_locked`].
    pub fn write_fifo_locked(&mut self, channel: usize, value: u32) -> Result<(), FifoError> {
        self.fifos
            .write_locked(channel, value, &mut self.semaphores, &mut self.scheduler)
    }

    /// See [`FifoTable::read_locked`].
    pub fn read_fifo_locked(&mut self, channel: usize) -> Result<u32, FifoError> {
        self.fifos
            .read_locked(channel, &mut self.semaphores, &mut self.scheduler)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Global instance
// ---------------------------------------------------------------------------

static KERNEL: Mutex<RefCell<Kernel>> = Mutex::new(RefCell::new(Kernel::new()));

/// Run `f` on the global kernel inside a critical section, then pend a
/// context switch if `f` asked for one.
fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    let (result, switch) = sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        let result = f(&mut *kernel);
        (result, kernel.take_reschedule())
    });
    if switch {
        arch::request_context_switch();
    }
    result
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel. Call once from `main` before anything else.
pub fn init() {
    with_kernel(Kernel::reset);
    arch::init();
}

/// Select the first thread and start scheduling. **Does not return.**
///
/// With no thread registered there is nothing to run: the error is logged
/// and the core halts.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn launch(mut core: cortex_m::Peripherals) -> ! {
    use crate::arch::cortex_m4;

    // Enabled again by the first thread.
    cortex_m::interrupt::disable();

    let first = sync::critical_section(|cs| {
        let mut kernel = KERNEL.borrow_ref_mut(cs);
        kernel.launch().map(|_| kernel.current_context())
    });
    let Some(sp) = first else {
        log::error!("launch: no thread registered");
        loop {
            arch::wait_for_interrupt();
        }
    };

    cortex_m4::set_interrupt_priorities(&mut core.SCB);
    cortex_m4::configure_systick(&mut core.SYST);

    unsafe { cortex_m4::start_first_thread(sp) }
}

pub fn add_thread(entry: ThreadEntry, priority: u8, name: &str) -> Result<ThreadId, SchedError> {
    with_kernel(|k| k.add_thread(entry, priority, name))
}

/// Run `handler` every `period` ticks, first on tick `execute_time`.
pub fn add_periodic_event(
    handler: EventHandler,
    period: u32,
    execute_time: u32,
) -> Result<(), SchedError> {
    with_kernel(|k| k.add_periodic_event(handler, period, execute_time))
}

/// Bind `handler` to interrupt `vector` (16..=155) at hardware level
/// `priority` (0..=6).
pub fn add_aperiodic_event(
    handler: InterruptHandler,
    priority: u8,
    vector: u32,
) -> Result<(), SchedError> {
    sync::critical_section(|_| {
        Kernel::add_aperiodic_event(&mut PlatformInterrupts, handler, priority, vector)
    })
}

pub fn kill_thread(id: ThreadId) -> Result<(), SchedError> {
    with_kernel(|k| k.kill_thread(id))
}

/// Kill the calling thread. Only returns on failure.
pub fn kill_self() -> Result<(), SchedError> {
    with_kernel(Kernel::kill_self)
}

pub fn thread_id() -> ThreadId {
    with_kernel(|k| k.thread_id())
}

pub fn number_of_threads() -> usize {
    with_kernel(|k| k.number_of_threads())
}

pub fn thread_state(id: ThreadId) -> ThreadState {
    with_kernel(|k| k.thread_state(id))
}

pub fn thread_name(id: ThreadId) -> Option<ThreadName> {
    with_kernel(|k| k.thread_name(id))
}

/// Suspend the calling thread for `ticks` ticks.
pub fn sleep(ticks: u32) {
    with_kernel(|k| k.sleep(ticks));
}

pub fn yield_now() {
    with_kernel(Kernel::yield_now);
}

/// Ticks since launch.
pub fn now() -> u64 {
    with_kernel(|k| k.scheduler.now())
}

pub fn init_semaphore(sem: SemaphoreId, value: i32) {
    with_kernel(|k| k.init_semaphore(sem, value));
}

/// Take one unit of `sem`, blocking until a `signal` hands one over.
pub fn wait(sem: SemaphoreId) {
    with_kernel(|k| k.wait(sem));
}

pub fn signal(sem: SemaphoreId) {
    with_kernel(|k| k.signal(sem));
}

pub fn init_fifo(channel: usize) -> Result<(), FifoError> {
    with_kernel(|k| k.init_fifo(channel))
}

/// Append `value` to `channel`. A full channel drops the value.
pub fn write_fifo(channel: usize, value: u32) -> Result<(), FifoError> {
    let mutex = with_kernel(|k| k.fifo_mutex(channel))?;
    wait(mutex);
    with_kernel(|k| k.write_fifo_locked(channel, value))
}

/// Remove the oldest value of `channel`. Returns `Empty` instead of blocking.
pub fn read_fifo(channel: usize) -> Result<u32, FifoError> {
    let mutex = with_kernel(|k| k.fifo_mutex(channel))?;
    wait(mutex);
    with_kernel(|k| k.read_fifo_locked(channel))
}

// ---------------------------------------------------------------------------
// Handler entry points
// ---------------------------------------------------------------------------

/// SysTick body. Due periodic handlers run after the kernel is released.
pub fn tick_handler() {
    let due = with_kernel(Kernel::tick);
    due.fire();
}

/// PendSV body: takes the outgoing PSP, returns the incoming one.
pub fn context_switch(psp: *mut u32) -> *mut u32 {
    sync::critical_section(|cs| KERNEL.borrow_ref_mut(cs).switch(psp))
}

/// Return address of every thread. A thread body that returns ends here.
pub extern "C" fn thread_exit() -> ! {
    if let Err(err) = kill_self() {
        log::error!("thread {} returned: {err}", thread_id());
    }
    loop {
        arch::wait_for_interrupt();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::CONTEXT_WORDS;

    extern "C" fn body() -> ! {
        loop {}
    }

    extern "C" fn isr() {}

    /// Records every call it receives.
    #[derive(Default)]
    struct MockController {
        calls: Vec<(&'static str, u32, u8)>,
    }

    impl InterruptController for MockController {
        fn register(&mut self, vector: u32, _handler: InterruptHandler) {
            self.calls.push(("register", vector, 0));
        }

        fn set_priority(&mut self, vector: u32, priority: u8) {
            self.calls.push(("set_priority", vector, priority));
        }

        fn enable(&mut self, vector: u32) {
            self.calls.push(("enable", vector, 0));
        }
    }

    fn kernel(priorities: &[u8]) -> Box<Kernel> {
        let mut k = Box::new(Kernel::new());
        for &priority in priorities {
            k.add_thread(body, priority, "t").unwrap();
        }
        k
    }

    #[test]
    fn test_aperiodic_event_reaches_controller() {
        let mut nvic = MockController::default();
        Kernel::add_aperiodic_event(&mut nvic, isr, 3, 46).unwrap();
        assert_eq!(
            nvic.calls,
            vec![("register", 46, 0), ("set_priority", 46, 3), ("enable", 46, 0)]
        );
    }

    #[test]
    fn test_invalid_aperiodic_event_registers_nothing() {
        let mut nvic = MockController::default();
        assert_eq!(
            Kernel::add_aperiodic_event(&mut nvic, isr, 3, 2),
            Err(SchedError::InvalidInterruptNumber)
        );
        assert_eq!(
            Kernel::add_aperiodic_event(&mut nvic, isr, 7, 46),
            Err(SchedError::InvalidHardwarePriority)
        );
        assert!(nvic.calls.is_empty());
    }

    #[test]
    fn test_kill_blocked_thread_withdraws_debt() {
        let sem = SemaphoreId::new(2);
        let mut k = kernel(&[255, 1, 1]);
        k.launch().unwrap();
        k.init_semaphore(sem, 0);

        // Slots 1 and 2 both wait.
        assert_eq!(k.wait(sem), WaitOutcome::Blocked);
        k.scheduler.schedule();
        assert_eq!(k.wait(sem), WaitOutcome::Blocked);
        assert_eq!(k.semaphores.count(sem), -2);

        let victim = k.scheduler.threads[1].id;
        k.kill_thread(victim).unwrap();
        assert_eq!(k.semaphores.count(sem), -1);
        assert_eq!(k.number_of_threads(), 2);

        // The single remaining debt goes to the surviving waiter.
        let survivor = k.scheduler.threads[2].id;
        assert_eq!(k.signal(sem), Some(survivor));
        assert_eq!(k.semaphores.count(sem), 0);
    }

    #[test]
    fn test_fifo_through_kernel() {
        let mut k = kernel(&[255]);
        k.launch().unwrap();
        k.init_fifo(1).unwrap();

        for value in [10, 20] {
            let mutex = k.fifo_mutex(1).unwrap();
            assert_eq!(k.wait(mutex), WaitOutcome::Acquired);
            k.write_fifo_locked(1, value).unwrap();
        }
        let mutex = k.fifo_mutex(1).unwrap();
        k.wait(mutex);
        assert_eq!(k.read_fifo_locked(1), Ok(10));
        assert_eq!(k.fifo_mutex(9), Err(FifoError::InvalidChannel));
    }

    #[test]
    fn test_switch_saves_and_restores_context() {
        let mut k = kernel(&[5, 5]);
        k.launch().unwrap();

        // The first thread has pushed 20 words on top of its initial frame.
        let first = k.current_context();
        let outgoing = first.wrapping_sub(20);
        let incoming = k.switch(outgoing);

        assert_eq!(k.scheduler.current, 1);
        assert_eq!(k.scheduler.threads[0].saved_sp, crate::config::STACK_WORDS - CONTEXT_WORDS - 20);
        assert_eq!(incoming, k.current_context());

        // Switching back lands on the saved position.
        let back = k.switch(incoming);
        assert_eq!(back, outgoing);
    }

    #[test]
    fn test_switch_after_kill_self_keeps_dead_context() {
        let mut k = kernel(&[255, 1]);
        k.launch().unwrap();
        let dying = k.current_context();
        k.kill_self().unwrap();

        // The slot is reused before the switch is taken.
        let fresh = k.add_thread(body, 1, "fresh").unwrap();
        let fresh_sp = k.scheduler.threads[1].saved_sp;
        k.switch(dying.wrapping_sub(8));

        assert_eq!(k.scheduler.threads[1].saved_sp, fresh_sp);
        assert_eq!(k.scheduler.current, 1);
        assert_eq!(k.thread_state(fresh), ThreadState::Running);
    }

    #[test]
    fn test_reused_slot_of_killed_thread_competes() {
        let mut k = Box::new(Kernel::new());
        k.add_thread(body, 255, "idle").unwrap();
        let worker = k.add_thread(body, 5, "worker").unwrap();
        k.add_thread(body, 5, "other").unwrap();
        assert_eq!(k.launch(), Some(worker));
        let outgoing = k.current_context();

        k.kill_thread(worker).unwrap();
        let urgent = k.add_thread(body, 0, "urgent").unwrap();
        assert_eq!(k.scheduler.slot_of(urgent), Some(1));
        assert_eq!(k.thread_state(urgent), ThreadState::Ready);
        assert_eq!(k.thread_id(), worker);

        let fresh_sp = k.scheduler.threads[1].saved_sp;
        let restored = k.switch(outgoing.wrapping_sub(8));
        assert_eq!(k.thread_id(), urgent);
        assert_eq!(k.thread_state(urgent), ThreadState::Running);
        assert_eq!(k.scheduler.threads[1].saved_sp, fresh_sp);
        assert_eq!(restored, k.current_context());
    }

    #[test]
    fn test_reschedule_requests_only_after_launch() {
        let mut k = kernel(&[255, 1]);
        k.yield_now();
        assert!(!k.take_reschedule());

        k.launch().unwrap();
        k.yield_now();
        assert!(k.take_reschedule());
        assert!(!k.take_reschedule());
    }

    #[test]
    fn test_introspection() {
        let mut k = kernel(&[255]);
        let worker = k.add_thread(body, 9, "worker").unwrap();
        assert_eq!(k.thread_priority(worker), Some(9));
        assert_eq!(k.thread_name(worker).unwrap().as_str(), "worker");
        assert_eq!(k.thread_state(worker), ThreadState::Ready);
        k.launch().unwrap();
        assert_eq!(k.thread_state(worker), ThreadState::Running);
        k.kill_thread(worker).unwrap();
        assert_eq!(k.thread_priority(worker), None);
    }

    #[test]
    fn test_global_instance() {
        use core::sync::atomic::{AtomicU32, Ordering};
        static FIRED: AtomicU32 = AtomicU32::new(0);
        fn every_tick() {
            // Handlers run outside the kernel borrow and may call the API.
            let _ = now();
            FIRED.fetch_add(1, Ordering::Relaxed);
        }
        const S: SemaphoreId = SemaphoreId::new(0);

        init();
        add_thread(body, 255, "idle").unwrap();
        add_thread(body, 1, "main").unwrap();
        add_periodic_event(every_tick, 1, 1).unwrap();
        assert_eq!(number_of_threads(), 2);

        let requests = arch::hosted::switch_requests();
        sync::critical_section(|cs| KERNEL.borrow_ref_mut(cs).launch());
        assert_eq!(thread_name(thread_id()).unwrap().as_str(), "main");

        init_semaphore(S, 1);
        wait(S);
        signal(S);
        init_fifo(0).unwrap();
        write_fifo(0, 42).unwrap();
        assert_eq!(read_fifo(0), Ok(42));
        assert_eq!(read_fifo(0), Err(FifoError::Empty));

        tick_handler();
        tick_handler();
        assert_eq!(now(), 2);
        assert_eq!(FIRED.load(Ordering::Relaxed), 2);
        assert!(arch::hosted::switch_requests() >= requests + 2);
        assert_eq!(add_aperiodic_event(isr, 9, 20), Err(SchedError::InvalidHardwarePriority));
    }
}
