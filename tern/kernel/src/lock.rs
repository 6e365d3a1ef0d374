//! The kernel lock
//!
//! A single global critical section serializes every kernel entry from
//! thread context and interrupt context on the one core. [`KernelCell`]
//! is that lock: `with` masks interrupts for the duration of the closure
//! (via the target's `critical-section` implementation) and hands out the
//! one `&mut` to the kernel state.
//!
//! The contract is strict:
//! - hold time must stay bounded (microseconds): do the queue or timer
//!   mutation, let any resulting reschedule run, get out;
//! - never block inside `with`; a blocking call while holding the lock is
//!   a fatal contract violation and the kernel will halt on it;
//! - `with` does not nest. Re-entering the lock from inside the closure is
//!   reported as a fatal borrow error. (Preemption locking *does* nest, via
//!   the scheduler-lock counter on the kernel itself.)

use core::cell::RefCell;
use critical_section::Mutex;

/// The kernel lock around the kernel state
///
/// On hosted builds the `critical-section` implementation is a process-wide
/// mutex, which doubles as the reentrancy guard the kernel needs in tests.
pub struct KernelCell<K> {
    inner: Mutex<RefCell<K>>,
}

impl<K> KernelCell<K> {
    /// Wrap a kernel instance in the lock
    pub const fn new(kernel: K) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(kernel)),
        }
    }

    /// Acquire the kernel lock for the duration of `f`
    ///
    /// Interrupts are masked before `f` runs and restored after it returns,
    /// including after any reschedule it triggers.
    pub fn with<R>(&self, f: impl FnOnce(&mut K) -> R) -> R {
        critical_section::with(|cs| {
            let mut kernel = self.inner.borrow_ref_mut(cs);
            f(&mut kernel)
        })
    }
}
