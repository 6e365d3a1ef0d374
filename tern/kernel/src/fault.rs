//! Fatal kernel faults
//!
//! Contract violations mean a kernel invariant can no longer be trusted, so
//! the only safe reaction is to stop: [`fault`] never returns. Recoverable
//! conditions (resource exhaustion) are *not* faults; they are reported as
//! [`tern_core::KernelError`] values to the caller.

use core::fmt;

/// The broken contract that halted the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A `ThreadId` referred to a vacant or out-of-range thread slot
    InvalidThread,
    /// A `QueueId` referred to a vacant or out-of-range wait queue slot
    InvalidQueue,
    /// A thread was inserted into a queue while already linked into one
    ThreadAlreadyQueued,
    /// A thread was removed from a queue it is not linked into
    ThreadNotQueued,
    /// `wake` was called on a thread that is not waiting
    WakeNotWaiting,
    /// A wait-queue insertion named a thread that is not waiting
    NotWaiting,
    /// A blocking operation was attempted from interrupt context
    BlockInInterrupt,
    /// A blocking operation was attempted with the scheduler lock held
    BlockWhileLocked,
    /// Dispatch found no runnable thread (the idle thread is missing)
    ReadyQueueEmpty,
    /// `sched_unlock` without a matching `sched_lock`
    SchedLockUnderflow,
    /// `isr_exit` without a matching `isr_enter`
    IsrUnderflow,
    /// An operation that needs a current thread ran before `start`
    NoCurrentThread,
    /// `start` was called on a kernel that is already running
    AlreadyStarted,
    /// `reclaim` was called on a thread that has not terminated
    ReclaimNotTerminated,
    /// Kernel time was asked to move backwards
    NonMonotonicTime,
    /// The timer set lost track of a slot it had just freed
    TimerSetOverflow,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::InvalidThread => write!(f, "invalid thread id"),
            FaultKind::InvalidQueue => write!(f, "invalid queue id"),
            FaultKind::ThreadAlreadyQueued => write!(f, "thread already queued"),
            FaultKind::ThreadNotQueued => write!(f, "thread not in queue"),
            FaultKind::WakeNotWaiting => write!(f, "wake of non-waiting thread"),
            FaultKind::NotWaiting => write!(f, "thread is not waiting"),
            FaultKind::BlockInInterrupt => write!(f, "blocking call in interrupt context"),
            FaultKind::BlockWhileLocked => write!(f, "blocking call under scheduler lock"),
            FaultKind::ReadyQueueEmpty => write!(f, "ready queue empty"),
            FaultKind::SchedLockUnderflow => write!(f, "scheduler lock underflow"),
            FaultKind::IsrUnderflow => write!(f, "isr nesting underflow"),
            FaultKind::NoCurrentThread => write!(f, "no current thread"),
            FaultKind::AlreadyStarted => write!(f, "kernel already started"),
            FaultKind::ReclaimNotTerminated => write!(f, "reclaim of live thread"),
            FaultKind::NonMonotonicTime => write!(f, "non-monotonic time"),
            FaultKind::TimerSetOverflow => write!(f, "timer set overflow"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FaultKind {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", defmt::Display2Format(self));
    }
}

/// Halt the kernel after a contract violation
///
/// Runs with the kernel lock held; there is nothing to release because
/// control never returns.
#[inline(never)]
pub fn fault(kind: FaultKind) -> ! {
    #[cfg(feature = "defmt")]
    defmt::error!("kernel fault: {}", kind);

    panic!("kernel fault: {}", kind);
}
