//! Thread control blocks and the thread table
//!
//! Threads live in a fixed-capacity table; a [`ThreadId`] is an index into
//! it. Queue membership is encoded as intrusive `prev`/`next` links inside
//! each control block, which is what makes every queue operation O(1): a
//! thread can be in at most one queue at a time, so one pair of links is
//! enough.

use tern_core::{KernelError, KResult, Priority, ThreadState, WakeReason};

use crate::fault::{fault, FaultKind};
use crate::queue::QueueId;
use crate::timer::TimerHandle;

/// Identity of a thread: an index into the kernel's thread table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadId(u8);

impl ThreadId {
    pub(crate) const fn from_index(index: usize) -> Self {
        ThreadId(index as u8)
    }

    /// Index of this thread in the thread table
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ThreadId({})", self.0);
    }
}

/// Creation-time thread parameters
#[derive(Debug, Clone, Copy)]
pub struct ThreadConfig {
    /// Thread name, for diagnostics
    pub name: &'static str,
    /// Scheduling priority (higher value = more urgent)
    pub priority: Priority,
    /// Round-robin time quantum in ticks; `0` disables time slicing
    pub quantum: u32,
}

impl ThreadConfig {
    /// Thread parameters with time slicing disabled
    pub const fn new(name: &'static str, priority: Priority) -> Self {
        Self {
            name,
            priority,
            quantum: 0,
        }
    }

    /// Enable round-robin slicing with the given quantum
    pub const fn with_quantum(mut self, quantum: u32) -> Self {
        self.quantum = quantum;
        self
    }
}

/// Intrusive queue linkage
///
/// Valid only while `queued` is set on the owning control block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueLink {
    pub(crate) next: Option<ThreadId>,
    pub(crate) prev: Option<ThreadId>,
}

impl QueueLink {
    const fn unlinked() -> Self {
        Self {
            next: None,
            prev: None,
        }
    }
}

/// Thread control block
///
/// State and queue membership are kept consistent by the scheduler:
/// `Ready` implies linked into the ready queue, `Running` implies it is the
/// kernel's current thread and linked nowhere, `Waiting` implies linked
/// into `waiting_on` (or into no queue for bare sleeps and signal waits).
pub struct Tcb<C> {
    pub(crate) name: &'static str,
    pub(crate) priority: Priority,
    pub(crate) state: ThreadState,
    /// Saved execution context, owned by the thread, opaque to the kernel
    pub(crate) context: C,
    pub(crate) link: QueueLink,
    pub(crate) queued: bool,
    pub(crate) waiting_on: Option<QueueId>,
    pub(crate) timeout: Option<TimerHandle>,
    pub(crate) wake_reason: Option<WakeReason>,
    pub(crate) quantum: u32,
    pub(crate) quantum_reload: u32,
}

impl<C> Tcb<C> {
    pub(crate) const fn new(config: ThreadConfig, context: C) -> Self {
        Self {
            name: config.name,
            priority: config.priority,
            state: ThreadState::Ready,
            context,
            link: QueueLink::unlinked(),
            queued: false,
            waiting_on: None,
            timeout: None,
            wake_reason: None,
            quantum: config.quantum,
            quantum_reload: config.quantum,
        }
    }

    /// Thread name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Scheduling priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Current scheduling state
    pub fn state(&self) -> ThreadState {
        self.state
    }
}

/// Fixed-capacity table of thread control blocks
pub struct ThreadTable<C, const N: usize> {
    slots: [Option<Tcb<C>>; N],
}

impl<C, const N: usize> ThreadTable<C, N> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [const { None }; N],
        }
    }

    /// Place a new control block in the first free slot
    pub(crate) fn alloc(&mut self, tcb: Tcb<C>) -> KResult<ThreadId> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(tcb);
                return Ok(ThreadId::from_index(index));
            }
        }
        Err(KernelError::NoThreadSlot)
    }

    /// Release a slot for reuse
    pub(crate) fn free(&mut self, tid: ThreadId) {
        if self.slots.get(tid.index()).map_or(true, Option::is_none) {
            fault(FaultKind::InvalidThread);
        }
        self.slots[tid.index()] = None;
    }

    /// Borrow a control block; fatal on a stale or vacant id
    pub(crate) fn get(&self, tid: ThreadId) -> &Tcb<C> {
        match self.slots.get(tid.index()) {
            Some(Some(tcb)) => tcb,
            _ => fault(FaultKind::InvalidThread),
        }
    }

    /// Mutably borrow a control block; fatal on a stale or vacant id
    pub(crate) fn get_mut(&mut self, tid: ThreadId) -> &mut Tcb<C> {
        match self.slots.get_mut(tid.index()) {
            Some(Some(tcb)) => tcb,
            _ => fault(FaultKind::InvalidThread),
        }
    }

    /// Mutably borrow two distinct control blocks at once
    ///
    /// Needed at the context-switch point, where the outgoing and incoming
    /// contexts are handed to the port together.
    pub(crate) fn pair_mut(&mut self, a: ThreadId, b: ThreadId) -> (&mut Tcb<C>, &mut Tcb<C>) {
        let (ia, ib) = (a.index(), b.index());
        if ia == ib || ia >= N || ib >= N {
            fault(FaultKind::InvalidThread);
        }
        let (lo, hi) = if ia < ib { (ia, ib) } else { (ib, ia) };
        let (left, right) = self.slots.split_at_mut(hi);
        let (first, second) = (left[lo].as_mut(), right[0].as_mut());
        match (first, second) {
            (Some(x), Some(y)) => {
                if ia < ib {
                    (x, y)
                } else {
                    (y, x)
                }
            }
            _ => fault(FaultKind::InvalidThread),
        }
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Check whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Table capacity
    pub const fn capacity(&self) -> usize {
        N
    }
}
