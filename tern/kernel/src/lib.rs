#![no_std]
#![forbid(unsafe_code)]

//! # TERN Kernel
//!
//! The scheduling core of the TERN real-time kernel: thread control blocks,
//! priority-ordered ready queues, FIFO wait queues, a deadline-sorted
//! virtual timer set, and the kernel lock discipline that keeps all of it
//! consistent between thread context and interrupt context on a single core.
//!
//! The whole kernel lives in one explicitly-owned [`Kernel`] value. Real
//! targets place it in a [`KernelCell`] (the kernel lock) and enter it from
//! threads and interrupt handlers alike; tests construct plain instances and
//! drive them directly. Context save/restore is not performed here; it is
//! an opaque capability supplied per target through the [`Port`] trait.
//!
//! Key properties:
//! - Preemptive, priority-based scheduling; equal priorities never preempt
//! - Strict FIFO ordering within a priority band
//! - Timed waits through deadline-sorted virtual timers
//! - Deferred context switches in interrupt context and under the
//!   scheduler lock
//! - Contract violations halt the kernel through the fault path

pub mod fault;
pub mod lock;
pub mod port;
pub mod queue;
pub mod sched;
pub mod thread;
pub mod timer;

pub use tern_core::*;

pub use fault::*;
pub use lock::*;
pub use port::*;
pub use queue::*;
pub use sched::*;
pub use thread::*;
pub use timer::*;
