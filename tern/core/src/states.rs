//! Thread lifecycle states and wake reasons

use core::fmt;

/// Thread scheduling state
///
/// The per-thread state machine is:
/// `Ready → Running → (Ready | Waiting | Terminated)`, `Waiting → Ready`.
/// `Terminated` is terminal. Exactly one thread is `Running` at a time on
/// a single core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Eligible to run; linked into the ready queue
    Ready,
    /// Owns the CPU; not linked into any queue
    Running,
    /// Blocked on a wait queue, a timed sleep, or a bare signal wait
    Waiting,
    /// Finished; never scheduled again
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::Ready => write!(f, "Ready"),
            ThreadState::Running => write!(f, "Running"),
            ThreadState::Waiting => write!(f, "Waiting"),
            ThreadState::Terminated => write!(f, "Terminated"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            ThreadState::Ready => defmt::write!(fmt, "Ready"),
            ThreadState::Running => defmt::write!(fmt, "Running"),
            ThreadState::Waiting => defmt::write!(fmt, "Waiting"),
            ThreadState::Terminated => defmt::write!(fmt, "Terminated"),
        }
    }
}

/// Why a waiting thread became ready again
///
/// Recorded when a thread leaves `Waiting` and kept until it blocks again,
/// so the code that resumes after a timed wait can tell a signal from a
/// timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Woken by an explicit `wake` (or `wake_one`)
    Signal,
    /// Woken because its timeout timer fired
    Timeout,
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeReason::Signal => write!(f, "Signal"),
            WakeReason::Timeout => write!(f, "Timeout"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for WakeReason {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            WakeReason::Signal => defmt::write!(fmt, "Signal"),
            WakeReason::Timeout => defmt::write!(fmt, "Timeout"),
        }
    }
}
