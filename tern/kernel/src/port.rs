//! Target port capability
//!
//! Context save/restore is the one thing this kernel cannot do portably.
//! Each target supplies it through [`Port`]; the scheduler treats the saved
//! context as an opaque value owned by the thread and only hands it to the
//! port while the kernel lock is held.

/// Context-switch capability supplied by the target-specific layer
///
/// `Context` is the saved execution state of one thread (CPU registers and
/// stack pointer on a real target, a plain recording struct in tests).
pub trait Port {
    /// Saved execution context of a thread
    type Context;

    /// Save `from` (when switching away from a live thread) and make `to`
    /// the executing context.
    ///
    /// `from` is `None` when entering the first thread at kernel start and
    /// when the outgoing thread has terminated.
    fn switch(from: Option<&mut Self::Context>, to: &mut Self::Context);
}
