//! Kernel time: monotonic instants and tick durations
//!
//! Kernel time is counted in ticks. It is advanced either by a periodic
//! time source (one tick at a time) or by a tickless source (jumping to an
//! absolute instant) and is monotonically non-decreasing either way.

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// A point in kernel time, measured in ticks since kernel start
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(u64);

impl Instant {
    /// Kernel start
    pub const ZERO: Self = Self(0);

    /// Create an instant from a raw tick count
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Get the raw tick count
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since an earlier instant
    pub fn elapsed_since(self, earlier: Instant) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0 + rhs.ticks() as u64)
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.ticks() as u64;
    }
}

impl Sub<Instant> for Instant {
    type Output = u64;

    fn sub(self, rhs: Instant) -> u64 {
        self.elapsed_since(rhs)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick:{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Instant {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "tick:{}", self.0);
    }
}

/// A span of kernel time, measured in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    ticks: u32,
}

impl Duration {
    /// Zero-length duration
    pub const ZERO: Self = Self { ticks: 0 };

    /// Longest representable duration
    pub const MAX: Self = Self { ticks: u32::MAX };

    /// Create a duration from ticks
    pub const fn from_ticks(ticks: u32) -> Self {
        Self { ticks }
    }

    /// Get the tick count
    pub const fn ticks(self) -> u32 {
        self.ticks
    }

    /// Check whether the duration is zero
    pub const fn is_zero(self) -> bool {
        self.ticks == 0
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration {
            ticks: self.ticks.saturating_add(rhs.ticks),
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ticks", self.ticks)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Duration {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}ticks", self.ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_arithmetic() {
        let t0 = Instant::ZERO;
        let t1 = t0 + Duration::from_ticks(10);
        assert_eq!(t1.ticks(), 10);
        assert_eq!(t1.elapsed_since(t0), 10);
        assert_eq!(t1 - t0, 10);
        assert!(t1 > t0);
    }

    #[test]
    fn test_elapsed_saturates() {
        let t0 = Instant::from_ticks(5);
        let t1 = Instant::from_ticks(9);
        // Asking for elapsed time "backwards" yields zero, not wraparound.
        assert_eq!(t0.elapsed_since(t1), 0);
    }

    #[test]
    fn test_duration() {
        let d = Duration::from_ticks(3) + Duration::from_ticks(4);
        assert_eq!(d.ticks(), 7);
        assert!(Duration::ZERO.is_zero());
        assert!(!d.is_zero());
    }
}
