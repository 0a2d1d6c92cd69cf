//! # Kernel Result Codes
//!
//! Every fallible kernel call returns one of these as the `Err` side of a
//! `Result`. Nothing in the kernel panics on a bad request; pool limits are
//! checked at call time and reported.

use core::fmt;

/// Failure of a scheduler or thread-lifecycle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// The thread or periodic-event pool is exhausted.
    ThreadLimitReached,
    /// No alive thread carries the requested ID.
    ThreadNotFound,
    /// The request would leave the system with no alive thread.
    CannotKillLastThread,
    /// The vector index is outside the device's interrupt range.
    InvalidInterruptNumber,
    /// The interrupt priority is outside the levels open to applications.
    InvalidHardwarePriority,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::ThreadLimitReached => "thread limit reached",
            Self::ThreadNotFound => "thread does not exist",
            Self::CannotKillLastThread => "cannot kill the last thread",
            Self::InvalidInterruptNumber => "invalid interrupt number",
            Self::InvalidHardwarePriority => "invalid hardware priority",
        };
        f.write_str(msg)
    }
}

/// Failure of a FIFO channel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    /// The channel index is out of range.
    InvalidChannel,
    /// Nothing to read.
    Empty,
    /// No room to write; the value was counted in `lost_data` and dropped.
    Full,
}

impl fmt::Display for FifoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::InvalidChannel => "invalid FIFO channel",
            Self::Empty => "FIFO empty",
            Self::Full => "FIFO full",
        };
        f.write_str(msg)
    }
}
