//! Hosted port: run the kernel on a development machine
//!
//! On real targets the port saves and restores CPU register state; here
//! there is no register state to move, so [`Hosted`] just records how often
//! each context was switched away from and into. Enabling the `std` feature
//! of `critical-section` (done by this crate's dependency) makes the kernel
//! lock a process-wide mutex, so [`tern_kernel::KernelCell`] works out of
//! the box in host binaries and tests.

use tern_kernel::{Kernel, Port};

/// Context-switch capability for hosted builds
pub struct Hosted;

/// Per-thread "context" on a host: switch counters instead of registers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostedContext {
    /// Times this context was switched away from
    pub saves: u64,
    /// Times this context was switched into
    pub restores: u64,
}

impl HostedContext {
    /// Fresh context that has never run
    pub const fn new() -> Self {
        Self {
            saves: 0,
            restores: 0,
        }
    }
}

impl Port for Hosted {
    type Context = HostedContext;

    fn switch(from: Option<&mut HostedContext>, to: &mut HostedContext) {
        if let Some(from) = from {
            from.saves += 1;
        }
        to.restores += 1;
    }
}

/// Kernel instantiated for the hosted port
pub type HostedKernel<const THREADS: usize, const TIMERS: usize, const QUEUES: usize> =
    Kernel<Hosted, THREADS, TIMERS, QUEUES>;

/// One iteration of a hosted idle loop
///
/// The idle thread on a host should not spin hot; yielding the OS thread
/// keeps simulations from pinning a core.
pub fn idle_once() {
    std::thread::yield_now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_kernel::{KernelCell, Priority, ThreadConfig, ThreadState};

    fn config(name: &'static str, level: u8) -> ThreadConfig {
        ThreadConfig::new(name, Priority::new_unchecked(level))
    }

    #[test]
    fn test_context_records_switches() {
        let mut kernel: HostedKernel<4, 2, 2> = HostedKernel::new();
        kernel.spawn(config("idle", 0), HostedContext::new()).unwrap();
        let worker = kernel.spawn(config("worker", 3), HostedContext::new()).unwrap();
        kernel.start();

        assert_eq!(kernel.current_thread(), Some(worker));

        kernel.wait();
        kernel.wake(worker);
        assert_eq!(kernel.current_thread(), Some(worker));
        assert_eq!(kernel.thread_state(worker), ThreadState::Running);
    }

    #[test]
    fn test_kernel_cell_serializes_entries() {
        static KERNEL: KernelCell<HostedKernel<4, 2, 2>> = KernelCell::new(HostedKernel::new());

        let worker = KERNEL.with(|kernel| {
            kernel.spawn(config("idle", 0), HostedContext::new()).unwrap();
            let worker = kernel.spawn(config("worker", 3), HostedContext::new()).unwrap();
            kernel.start();
            worker
        });

        // A second entry, as an interrupt handler would make one.
        KERNEL.with(|kernel| {
            kernel.isr_enter();
            kernel.tick_advance();
            kernel.isr_exit();
        });

        assert_eq!(KERNEL.with(|kernel| kernel.current_thread()), Some(worker));
    }
}
