//! Thread priorities and priority bitmaps
//!
//! The convention throughout the kernel is that a *higher* numeric value is
//! *more* urgent. Priorities range over `0 ..= 31`; the lowest level is
//! conventionally reserved for the idle thread.

use core::fmt;
use crate::{KernelError, KResult};

/// Type-safe thread priority
///
/// Higher numeric value means more urgent. A thread only preempts another
/// when its priority is strictly higher; equal priorities never preempt
/// each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    /// Number of distinct priority levels
    pub const LEVELS: usize = 32;

    /// Lowest priority level (idle)
    pub const MIN: Priority = Priority(0);

    /// Highest priority level
    pub const MAX: Priority = Priority(Self::LEVELS as u8 - 1);

    /// Create a new priority level
    pub fn new(level: u8) -> KResult<Self> {
        if level as usize >= Self::LEVELS {
            Err(KernelError::InvalidPriority)
        } else {
            Ok(Priority(level))
        }
    }

    /// Create a priority without validation (const fn)
    pub const fn new_unchecked(level: u8) -> Self {
        Priority(level)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Index of this priority in a per-level table
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// Bitmap of occupied priority levels
///
/// One bit per priority level; finding the highest occupied level is a
/// single leading-zeros instruction, which is what keeps the ready queue's
/// `pop_highest` O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySet(u32);

impl PrioritySet {
    /// Empty priority set
    pub const EMPTY: Self = Self(0);

    /// Create a new empty priority set
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Mark a priority level as occupied
    pub fn set(&mut self, priority: Priority) {
        self.0 |= 1u32 << priority.raw();
    }

    /// Mark a priority level as empty
    pub fn clear(&mut self, priority: Priority) {
        self.0 &= !(1u32 << priority.raw());
    }

    /// Check whether a priority level is occupied
    pub const fn is_set(&self, priority: Priority) -> bool {
        (self.0 & (1u32 << priority.raw())) != 0
    }

    /// Check whether the set is empty
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Find the highest occupied priority level
    pub fn highest(&self) -> Option<Priority> {
        if self.is_empty() {
            None
        } else {
            let msb = 31 - self.0.leading_zeros();
            Some(Priority(msb as u8))
        }
    }
}

impl Default for PrioritySet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PrioritySet {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "PrioritySet({=u32:b})", self.0);
    }
}

/// Macro to create compile-time priority constants
#[macro_export]
macro_rules! priority {
    ($value:literal) => {
        $crate::Priority::new_unchecked($value)
    };
}
