//! # Kestrel Example Firmware
//!
//! Demonstrates the kernel on a TM4C123 board with five threads, one
//! periodic event and one aperiodic event:
//!
//! | Thread | Priority | Behavior |
//! |--------|----------|----------|
//! | `idle` | 255 | Waits for interrupts; runs only when nothing else can |
//! | `producer` | 2 | Writes a sequence number to FIFO 0 every 10 ticks |
//! | `consumer` | 2 | Drains FIFO 0 into a semaphore-guarded total |
//! | `auditor` | 4 | Reads the total under the same semaphore every 100 ticks |
//! | `button` | 1 | Waits for the button semaphore, then spawns a one-shot worker |
//!
//! - **Heartbeat** (periodic, every 500 ticks): counts beats
//! - **GPIO Port F** (aperiodic, vector 46, level 2): signals `button`
//!
//! Built for the host, the binary instead steps a kernel value through a
//! few ticks and prints which thread runs on each.

#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::sync::atomic::{AtomicU32, Ordering};

    use cortex_m_rt::entry;
    use panic_halt as _;

    use kestrel::{kernel, FifoError, SemaphoreId};

    const TOTAL_LOCK: SemaphoreId = SemaphoreId::new(0);
    const BUTTON: SemaphoreId = SemaphoreId::new(1);
    const SAMPLES: usize = 0;

    /// GPIO Port F interrupt: IRQ 30.
    const GPIO_PORTF_VECTOR: u32 = 46;
    /// GPIO Port F interrupt clear register.
    const GPIO_PORTF_ICR: *mut u32 = 0x4002_541C as *mut u32;

    /// Only touched while holding `TOTAL_LOCK`.
    static TOTAL: AtomicU32 = AtomicU32::new(0);
    static HEARTBEATS: AtomicU32 = AtomicU32::new(0);

    // -----------------------------------------------------------------------
    // Threads
    // -----------------------------------------------------------------------

    extern "C" fn idle() -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }

    extern "C" fn producer() -> ! {
        let mut sequence: u32 = 0;
        loop {
            // A full channel drops the sample; the consumer catches up.
            let _ = kernel::write_fifo(SAMPLES, sequence);
            sequence = sequence.wrapping_add(1);
            kernel::sleep(10);
        }
    }

    extern "C" fn consumer() -> ! {
        loop {
            match kernel::read_fifo(SAMPLES) {
                Ok(sample) => {
                    kernel::wait(TOTAL_LOCK);
                    let total = TOTAL.load(Ordering::Relaxed);
                    TOTAL.store(total.wrapping_add(sample), Ordering::Relaxed);
                    kernel::signal(TOTAL_LOCK);
                }
                Err(FifoError::Empty) => kernel::sleep(5),
                Err(err) => {
                    log::error!("consumer: {err}");
                    let _ = kernel::kill_self();
                }
            }
        }
    }

    extern "C" fn auditor() -> ! {
        loop {
            kernel::wait(TOTAL_LOCK);
            let total = TOTAL.load(Ordering::Relaxed);
            kernel::signal(TOTAL_LOCK);
            log::info!(
                "t={} total={total} heartbeats={}",
                kernel::now(),
                HEARTBEATS.load(Ordering::Relaxed)
            );
            kernel::sleep(100);
        }
    }

    extern "C" fn button() -> ! {
        loop {
            kernel::wait(BUTTON);
            if let Err(err) = kernel::add_thread(one_shot, 3, "one-shot") {
                log::warn!("button: {err}");
            }
        }
    }

    /// Runs once and leaves the pool.
    extern "C" fn one_shot() -> ! {
        log::info!("one-shot {} running", kernel::thread_id());
        let _ = kernel::kill_self();
        loop {
            cortex_m::asm::wfi();
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    fn heartbeat() {
        HEARTBEATS.fetch_add(1, Ordering::Relaxed);
    }

    extern "C" fn gpio_portf() {
        unsafe { GPIO_PORTF_ICR.write_volatile(0x11) };
        kernel::signal(BUTTON);
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    #[entry]
    fn main() -> ! {
        let cp = cortex_m::Peripherals::take().expect("core peripherals already taken");

        kernel::init();

        kernel::init_semaphore(TOTAL_LOCK, 1);
        kernel::init_semaphore(BUTTON, 0);
        kernel::init_fifo(SAMPLES).expect("FIFO channel 0");

        kernel::add_thread(idle, 255, "idle").expect("Failed to create idle");
        kernel::add_thread(producer, 2, "producer").expect("Failed to create producer");
        kernel::add_thread(consumer, 2, "consumer").expect("Failed to create consumer");
        kernel::add_thread(auditor, 4, "auditor").expect("Failed to create auditor");
        kernel::add_thread(button, 1, "button").expect("Failed to create button");

        kernel::add_periodic_event(heartbeat, 500, 500).expect("Failed to add heartbeat");
        kernel::add_aperiodic_event(gpio_portf, 2, GPIO_PORTF_VECTOR)
            .expect("Failed to bind GPIO Port F");

        kernel::launch(cp)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    use kestrel::{Kernel, ThreadState};

    extern "C" fn body() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    let mut kernel = Box::new(Kernel::new());
    kernel.add_thread(body, 255, "idle").expect("idle");
    kernel.add_thread(body, 3, "sensor").expect("sensor");
    kernel.add_thread(body, 3, "logger").expect("logger");
    let control = kernel.add_thread(body, 1, "control").expect("control");
    kernel.launch().expect("no thread to launch");

    for _ in 0..12 {
        let id = kernel.thread_id();
        let name = kernel.thread_name(id).unwrap_or_default();
        println!("tick {:>2}: {name}", kernel.scheduler.now());

        // The control loop does its work, then sleeps for 4 ticks.
        if id == control && kernel.thread_state(control) == ThreadState::Running {
            kernel.sleep(4);
        }
        kernel.tick().fire();
        kernel.scheduler.schedule();
    }
}
