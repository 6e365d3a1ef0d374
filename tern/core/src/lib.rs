#![no_std]
#![forbid(unsafe_code)]

//! # TERN Core
//!
//! Core value types for the TERN real-time kernel: priorities and priority
//! bitmaps, kernel time, thread states, and the recoverable error type.
//! These types are shared between the kernel proper and the layers built
//! on top of it (synchronization primitives, ports, applications).

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod priorities;
pub mod states;
pub mod time;

pub use priorities::*;
pub use states::*;
pub use time::*;

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the kernel
pub type KResult<T> = Result<T, KernelError>;

/// Recoverable kernel errors
///
/// These are the errors a caller can act on: resource exhaustion during
/// object creation and parameter validation failures. Contract violations
/// (broken kernel invariants) are not represented here; they are fatal and
/// go through the kernel fault path instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free slot in the thread table
    NoThreadSlot,
    /// No free slot in the virtual timer set
    NoTimerSlot,
    /// No free slot in the wait queue pool
    NoQueueSlot,
    /// Priority outside the supported range
    InvalidPriority,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NoThreadSlot => write!(f, "thread table is full"),
            KernelError::NoTimerSlot => write!(f, "timer set is full"),
            KernelError::NoQueueSlot => write!(f, "wait queue pool is full"),
            KernelError::InvalidPriority => write!(f, "priority out of range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KernelError {}

#[cfg(feature = "defmt")]
impl defmt::Format for KernelError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            KernelError::NoThreadSlot => defmt::write!(fmt, "NoThreadSlot"),
            KernelError::NoTimerSlot => defmt::write!(fmt, "NoTimerSlot"),
            KernelError::NoQueueSlot => defmt::write!(fmt, "NoQueueSlot"),
            KernelError::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
        }
    }
}
