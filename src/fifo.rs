//! # IPC FIFO Channels
//!
//! Fixed-capacity ring buffers of 32-bit words, one per channel index. Each
//! channel is guarded by two semaphores from the kernel's semaphore table:
//! a mutex serializing `head` / `tail` updates and an occupancy semaphore
//! counting filled slots.
//!
//! Access is split in two steps. The caller first waits on the channel's
//! mutex (a suspension point: the thread may block there), then calls one
//! of the `*_locked` operations, which always releases the mutex before
//! returning. Writes into a full channel drop the value and count it in
//! `lost_data`; reads from an empty channel return `Empty` right away
//! rather than blocking.

use crate::config::{FIFO_SIZE, MAX_FIFOS};
use crate::error::FifoError;
use crate::scheduler::Scheduler;
use crate::semaphore::{SemaphoreId, SemaphoreTable};

/// One channel's storage and cursors, `N` elements deep.
#[derive(Clone, Copy)]
pub struct Fifo<const N: usize = FIFO_SIZE> {
    buffer: [u32; N],
    head: usize,
    tail: usize,
    lost_data: u32,
}

impl<const N: usize> Fifo<N> {
    pub const EMPTY: Self = Self {
        buffer: [0; N],
        head: 0,
        tail: 0,
        lost_data: 0,
    };

    /// Index of the next element to read.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Index of the next slot to write.
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Writes dropped because the channel was full.
    pub fn lost_data(&self) -> u32 {
        self.lost_data
    }

    fn store(&mut self, value: u32) {
        self.buffer[self.tail] = value;
        self.tail = (self.tail + 1) % N;
    }

    fn load(&mut self) -> u32 {
        let value = self.buffer[self.head];
        self.head = (self.head + 1) % N;
        value
    }
}

/// All FIFO channels of the system.
pub struct FifoTable<const N: usize = FIFO_SIZE> {
    channels: [Fifo<N>; MAX_FIFOS],
}

impl<const N: usize> FifoTable<N> {
    pub const fn new() -> Self {
        Self {
            channels: [Fifo::EMPTY; MAX_FIFOS],
        }
    }

    pub fn channel(&self, channel: usize) -> Result<&Fifo<N>, FifoError> {
        self.channels.get(channel).ok_or(FifoError::InvalidChannel)
    }

    /// Mutex a caller must hold around `write_locked` / `read_locked`.
    pub fn mutex(&self, channel: usize) -> Result<SemaphoreId, FifoError> {
        self.channel(channel)?;
        Ok(SemaphoreId::fifo_mutex(channel))
    }

    /// Elements currently stored, as counted by the occupancy semaphore.
    pub fn len(&self, channel: usize, sems: &SemaphoreTable) -> Result<usize, FifoError> {
        self.channel(channel)?;
        let count = sems.count(SemaphoreId::fifo_occupancy(channel));
        Ok(count.max(0) as usize)
    }

    /// Empty the channel: cursors to the start, occupancy 0, mutex free.
    pub fn init(&mut self, channel: usize, sems: &mut SemaphoreTable) -> Result<(), FifoError> {
        let fifo = self.channels.get_mut(channel).ok_or(FifoError::InvalidChannel)?;
        fifo.head = 0;
        fifo.tail = 0;
        fifo.lost_data = 0;
        sems.init(SemaphoreId::fifo_occupancy(channel), 0);
        sems.init(SemaphoreId::fifo_mutex(channel), 1);
        Ok(())
    }

    /// Append `value`. The caller holds the channel mutex; it is released
    /// on every path.
    pub fn write_locked(
        &mut self,
        channel: usize,
        value: u32,
        sems: &mut SemaphoreTable,
        scheduler: &mut Scheduler,
    ) -> Result<(), FifoError> {
        let fifo = self.channels.get_mut(channel).ok_or(FifoError::InvalidChannel)?;
        let mutex = SemaphoreId::fifo_mutex(channel);
        let occupancy = SemaphoreId::fifo_occupancy(channel);

        if sems.count(occupancy) >= N as i32 {
            fifo.lost_data += 1;
            sems.signal(mutex, scheduler);
            return Err(FifoError::Full);
        }

        fifo.store(value);
        sems.signal(occupancy, scheduler);
        sems.signal(mutex, scheduler);
        Ok(())
    }

    /// Remove the oldest value. The caller holds the channel mutex; it is
    /// released on every path.
    pub fn read_locked(
        &mut self,
        channel: usize,
        sems: &mut SemaphoreTable,
        scheduler: &mut Scheduler,
    ) -> Result<u32, FifoError> {
        let fifo = self.channels.get_mut(channel).ok_or(FifoError::InvalidChannel)?;
        let mutex = SemaphoreId::fifo_mutex(channel);
        let occupancy = SemaphoreId::fifo_occupancy(channel);

        if sems.count(occupancy) <= 0 {
            sems.signal(mutex, scheduler);
            return Err(FifoError::Empty);
        }

        let value = fifo.load();
        // Occupancy is positive, so this never blocks.
        sems.wait(occupancy, scheduler);
        sems.signal(mutex, scheduler);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semaphore::WaitOutcome;

    const CAP: usize = 4;

    extern "C" fn body() -> ! {
        loop {}
    }

    struct Rig {
        fifos: FifoTable<CAP>,
        sems: SemaphoreTable,
        sched: Scheduler,
    }

    impl Rig {
        fn new(threads: usize) -> Self {
            let mut sched = Scheduler::new();
            for _ in 0..threads {
                sched.add_thread(body, 10, "t").unwrap();
            }
            sched.launch().unwrap();
            let mut rig = Self {
                fifos: FifoTable::new(),
                sems: SemaphoreTable::new(),
                sched,
            };
            rig.fifos.init(0, &mut rig.sems).unwrap();
            rig
        }

        fn write(&mut self, channel: usize, value: u32) -> Result<(), FifoError> {
            let mutex = self.fifos.mutex(channel)?;
            assert_eq!(self.sems.wait(mutex, &mut self.sched), WaitOutcome::Acquired);
            self.fifos.write_locked(channel, value, &mut self.sems, &mut self.sched)
        }

        fn read(&mut self, channel: usize) -> Result<u32, FifoError> {
            let mutex = self.fifos.mutex(channel)?;
            assert_eq!(self.sems.wait(mutex, &mut self.sched), WaitOutcome::Acquired);
            self.fifos.read_locked(channel, &mut self.sems, &mut self.sched)
        }
    }

    #[test]
    fn test_fill_then_drain() {
        let mut rig = Rig::new(1);

        for value in 0..CAP as u32 {
            assert_eq!(rig.write(0, value), Ok(()));
        }
        assert_eq!(rig.write(0, 99), Err(FifoError::Full));
        assert_eq!(rig.fifos.channel(0).unwrap().lost_data(), 1);
        assert_eq!(rig.fifos.len(0, &rig.sems), Ok(CAP));

        for value in 0..CAP as u32 {
            assert_eq!(rig.read(0), Ok(value));
        }
        assert_eq!(rig.read(0), Err(FifoError::Empty));

        // The mutex is free again after every path.
        assert_eq!(rig.sems.count(SemaphoreId::fifo_mutex(0)), 1);
    }

    #[test]
    fn test_capacity_four_scenario() {
        let mut rig = Rig::new(1);

        for value in 1..=4 {
            assert_eq!(rig.write(0, value), Ok(()));
        }
        assert_eq!(rig.write(0, 5), Err(FifoError::Full));
        assert_eq!(rig.fifos.channel(0).unwrap().lost_data(), 1);

        let drained: Vec<_> = (0..4).map(|_| rig.read(0)).collect();
        assert_eq!(drained, vec![Ok(1), Ok(2), Ok(3), Ok(4)]);
        assert_eq!(rig.read(0), Err(FifoError::Empty));
    }

    #[test]
    fn test_cursors_wrap() {
        let mut rig = Rig::new(1);

        for value in 0..=CAP as u32 {
            assert_eq!(rig.write(0, value), Ok(()));
            assert_eq!(rig.read(0), Ok(value));
        }
        let fifo = rig.fifos.channel(0).unwrap();
        assert_eq!(fifo.head(), (CAP + 1) % CAP);
        assert_eq!(fifo.tail(), fifo.head());
        assert_eq!(fifo.lost_data(), 0);
    }

    #[test]
    fn test_invalid_channel() {
        let mut rig = Rig::new(1);
        assert_eq!(rig.fifos.init(MAX_FIFOS, &mut rig.sems), Err(FifoError::InvalidChannel));
        assert_eq!(rig.write(MAX_FIFOS, 1), Err(FifoError::InvalidChannel));
        assert_eq!(rig.read(MAX_FIFOS), Err(FifoError::InvalidChannel));
    }

    #[test]
    fn test_init_discards_contents() {
        let mut rig = Rig::new(1);
        rig.write(0, 1).unwrap();
        rig.write(0, 2).unwrap();

        rig.fifos.init(0, &mut rig.sems).unwrap();
        assert_eq!(rig.fifos.len(0, &rig.sems), Ok(0));
        assert_eq!(rig.read(0), Err(FifoError::Empty));
    }

    #[test]
    fn test_contended_mutex_hands_over() {
        let mut rig = Rig::new(2);
        let mutex = rig.fifos.mutex(0).unwrap();

        // Slot 0 takes the mutex and is preempted before writing.
        assert_eq!(rig.sems.wait(mutex, &mut rig.sched), WaitOutcome::Acquired);
        assert_eq!(rig.sched.schedule(), 1);

        // Slot 1 tries to read and blocks on the mutex.
        assert_eq!(rig.sems.wait(mutex, &mut rig.sched), WaitOutcome::Blocked);
        assert_eq!(rig.sched.schedule(), 0);

        // Slot 0 finishes; releasing the mutex unblocks slot 1, which then
        // holds it and reads the value.
        rig.fifos.write_locked(0, 7, &mut rig.sems, &mut rig.sched).unwrap();
        assert_eq!(rig.sched.threads[1].blocked_on, None);
        assert_eq!(rig.sched.schedule(), 1);
        assert_eq!(rig.fifos.read_locked(0, &mut rig.sems, &mut rig.sched), Ok(7));
        assert_eq!(rig.sems.count(mutex), 1);
    }
}
