//! Thread queues: FIFO wait queues and the priority-ordered ready queue
//!
//! All queues are intrusive doubly-linked lists threaded through the
//! control blocks in the thread table, so insertion, removal and pop are
//! O(1) and a thread can never appear twice. Every operation here assumes
//! the caller already holds the kernel lock; none of them block.

use tern_core::{KernelError, KResult, Priority, PrioritySet};

use crate::fault::{fault, FaultKind};
use crate::thread::{ThreadId, ThreadTable};

/// FIFO queue of threads
///
/// Used directly as a wait queue, and per priority band inside
/// [`ReadyQueue`]. Order among entries is strict insertion order.
#[derive(Debug, Clone, Copy)]
pub struct ThreadQueue {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
    len: usize,
}

impl ThreadQueue {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Thread at the head of the queue, if any
    pub fn head(&self) -> Option<ThreadId> {
        self.head
    }

    /// Number of queued threads
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append a thread at the tail; fatal if it is already in some queue
    pub fn push_back<C, const N: usize>(
        &mut self,
        threads: &mut ThreadTable<C, N>,
        tid: ThreadId,
    ) {
        if threads.get(tid).queued {
            fault(FaultKind::ThreadAlreadyQueued);
        }
        let old_tail = self.tail;
        {
            let tcb = threads.get_mut(tid);
            tcb.link.prev = old_tail;
            tcb.link.next = None;
            tcb.queued = true;
        }
        match old_tail {
            Some(tail) => threads.get_mut(tail).link.next = Some(tid),
            None => self.head = Some(tid),
        }
        self.tail = Some(tid);
        self.len += 1;
    }

    /// Detach and return the head thread
    pub fn pop_front<C, const N: usize>(
        &mut self,
        threads: &mut ThreadTable<C, N>,
    ) -> Option<ThreadId> {
        let tid = self.head?;
        let next = {
            let tcb = threads.get_mut(tid);
            let next = tcb.link.next;
            tcb.link.next = None;
            tcb.link.prev = None;
            tcb.queued = false;
            next
        };
        self.head = next;
        match next {
            Some(n) => threads.get_mut(n).link.prev = None,
            None => self.tail = None,
        }
        self.len -= 1;
        Some(tid)
    }

    /// Detach a specific thread; fatal if it is not in *this* queue
    ///
    /// A miss here means some other part of the state machine already moved
    /// the thread, so queue linkage can no longer be trusted.
    pub fn remove<C, const N: usize>(&mut self, threads: &mut ThreadTable<C, N>, tid: ThreadId) {
        if !self.contains(threads, tid) {
            fault(FaultKind::ThreadNotQueued);
        }
        let (prev, next) = {
            let tcb = threads.get_mut(tid);
            let links = (tcb.link.prev, tcb.link.next);
            tcb.link.prev = None;
            tcb.link.next = None;
            tcb.queued = false;
            links
        };
        match prev {
            Some(p) => threads.get_mut(p).link.next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => threads.get_mut(n).link.prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Check whether a thread is linked into this queue
    pub fn contains<C, const N: usize>(&self, threads: &ThreadTable<C, N>, tid: ThreadId) -> bool {
        let mut cursor = self.head;
        while let Some(at) = cursor {
            if at == tid {
                return true;
            }
            cursor = threads.get(at).link.next;
        }
        false
    }
}

impl Default for ThreadQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The ready queue: one FIFO band per priority level plus an occupancy bitmap
///
/// Insertion goes to the tail of the thread's band, so threads of equal
/// priority run in strict FIFO order; `pop_highest` takes the head of the
/// highest occupied band via the bitmap, keeping the whole thing O(1).
pub struct ReadyQueue {
    levels: [ThreadQueue; Priority::LEVELS],
    occupied: PrioritySet,
}

impl ReadyQueue {
    /// Create an empty ready queue
    pub const fn new() -> Self {
        Self {
            levels: [const { ThreadQueue::new() }; Priority::LEVELS],
            occupied: PrioritySet::EMPTY,
        }
    }

    /// Insert a thread at the tail of its priority band
    pub fn insert<C, const N: usize>(&mut self, threads: &mut ThreadTable<C, N>, tid: ThreadId) {
        let priority = threads.get(tid).priority;
        self.levels[priority.index()].push_back(threads, tid);
        self.occupied.set(priority);
    }

    /// Detach a specific thread; fatal if it is not ready-queued
    pub fn remove<C, const N: usize>(&mut self, threads: &mut ThreadTable<C, N>, tid: ThreadId) {
        let priority = threads.get(tid).priority;
        let band = &mut self.levels[priority.index()];
        band.remove(threads, tid);
        if band.is_empty() {
            self.occupied.clear(priority);
        }
    }

    /// Detach and return the highest-priority thread, FIFO within its band
    pub fn pop_highest<C, const N: usize>(
        &mut self,
        threads: &mut ThreadTable<C, N>,
    ) -> Option<ThreadId> {
        let priority = self.occupied.highest()?;
        let band = &mut self.levels[priority.index()];
        let tid = band.pop_front(threads);
        if band.is_empty() {
            self.occupied.clear(priority);
        }
        tid
    }

    /// Thread that `pop_highest` would return, without detaching it
    pub fn peek(&self) -> Option<ThreadId> {
        let priority = self.occupied.highest()?;
        self.levels[priority.index()].head()
    }

    /// Highest occupied priority level
    pub fn peek_priority(&self) -> Option<Priority> {
        self.occupied.highest()
    }

    /// Check whether a priority band has any ready thread
    ///
    /// The running thread is never in the ready queue, so a non-empty band
    /// at the running thread's priority means it has runnable peers.
    pub fn band_is_empty(&self, priority: Priority) -> bool {
        self.levels[priority.index()].is_empty()
    }

    /// Check whether the whole ready queue is empty
    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a wait queue in the kernel's wait queue pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueId(u8);

impl QueueId {
    /// Index of this queue in the pool
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QueueId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QueueId({})", self.0);
    }
}

/// Pool of wait queues owned by the kernel
///
/// Synchronization primitives built on top of the kernel allocate a queue
/// once at initialization and refer to it by [`QueueId`] from then on. The
/// kernel owning all queue linkage is what allows the timeout path to
/// unlink a waiter without cooperation from the queue's user. Queues are
/// never torn down; their lifetime is the kernel's.
pub struct WaitQueues<const Q: usize> {
    queues: [Option<ThreadQueue>; Q],
}

impl<const Q: usize> WaitQueues<Q> {
    pub(crate) const fn new() -> Self {
        Self {
            queues: [const { None }; Q],
        }
    }

    /// Allocate a new empty wait queue
    pub fn create(&mut self) -> KResult<QueueId> {
        for (index, slot) in self.queues.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(ThreadQueue::new());
                return Ok(QueueId(index as u8));
            }
        }
        Err(KernelError::NoQueueSlot)
    }

    /// Borrow a wait queue; fatal on an invalid id
    pub fn queue(&self, qid: QueueId) -> &ThreadQueue {
        match self.queues.get(qid.index()) {
            Some(Some(queue)) => queue,
            _ => fault(FaultKind::InvalidQueue),
        }
    }

    /// Mutably borrow a wait queue; fatal on an invalid id
    pub fn queue_mut(&mut self, qid: QueueId) -> &mut ThreadQueue {
        match self.queues.get_mut(qid.index()) {
            Some(Some(queue)) => queue,
            _ => fault(FaultKind::InvalidQueue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::{Tcb, ThreadConfig};

    fn spawn_at<const N: usize>(table: &mut ThreadTable<(), N>, level: u8) -> ThreadId {
        let config = ThreadConfig::new("t", Priority::new_unchecked(level));
        table.alloc(Tcb::new(config, ())).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut table: ThreadTable<(), 4> = ThreadTable::new();
        let mut queue = ThreadQueue::new();

        let a = spawn_at(&mut table, 1);
        let b = spawn_at(&mut table, 1);
        let c = spawn_at(&mut table, 1);

        queue.push_back(&mut table, a);
        queue.push_back(&mut table, b);
        queue.push_back(&mut table, c);
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop_front(&mut table), Some(a));
        assert_eq!(queue.pop_front(&mut table), Some(b));
        assert_eq!(queue.pop_front(&mut table), Some(c));
        assert_eq!(queue.pop_front(&mut table), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_middle() {
        let mut table: ThreadTable<(), 4> = ThreadTable::new();
        let mut queue = ThreadQueue::new();

        let a = spawn_at(&mut table, 1);
        let b = spawn_at(&mut table, 1);
        let c = spawn_at(&mut table, 1);
        queue.push_back(&mut table, a);
        queue.push_back(&mut table, b);
        queue.push_back(&mut table, c);

        queue.remove(&mut table, b);
        assert!(!queue.contains(&table, b));
        assert_eq!(queue.pop_front(&mut table), Some(a));
        assert_eq!(queue.pop_front(&mut table), Some(c));

        // Once removed, the thread can be queued elsewhere.
        let mut other = ThreadQueue::new();
        other.push_back(&mut table, b);
        assert_eq!(other.head(), Some(b));
    }

    #[test]
    #[should_panic(expected = "thread not in queue")]
    fn test_remove_absent_is_fatal() {
        let mut table: ThreadTable<(), 4> = ThreadTable::new();
        let mut queue = ThreadQueue::new();
        let a = spawn_at(&mut table, 1);
        queue.remove(&mut table, a);
    }

    #[test]
    #[should_panic(expected = "thread already queued")]
    fn test_double_insert_is_fatal() {
        let mut table: ThreadTable<(), 4> = ThreadTable::new();
        let mut queue = ThreadQueue::new();
        let a = spawn_at(&mut table, 1);
        queue.push_back(&mut table, a);
        queue.push_back(&mut table, a);
    }

    #[test]
    fn test_ready_queue_priority_order() {
        let mut table: ThreadTable<(), 8> = ThreadTable::new();
        let mut ready = ReadyQueue::new();

        let low = spawn_at(&mut table, 1);
        let high = spawn_at(&mut table, 5);
        let mid_a = spawn_at(&mut table, 3);
        let mid_b = spawn_at(&mut table, 3);

        for tid in [low, mid_a, high, mid_b] {
            ready.insert(&mut table, tid);
        }

        // Highest priority first, FIFO among equals.
        assert_eq!(ready.peek(), Some(high));
        assert_eq!(ready.pop_highest(&mut table), Some(high));
        assert_eq!(ready.pop_highest(&mut table), Some(mid_a));
        assert_eq!(ready.pop_highest(&mut table), Some(mid_b));
        assert_eq!(ready.pop_highest(&mut table), Some(low));
        assert!(ready.is_empty());
    }

    #[test]
    fn test_pop_highest_dominates_remaining() {
        let mut table: ThreadTable<(), 8> = ThreadTable::new();
        let mut ready = ReadyQueue::new();

        let levels = [4u8, 1, 7, 7, 2];
        for level in levels {
            let tid = spawn_at(&mut table, level);
            ready.insert(&mut table, tid);
        }

        let mut last = u8::MAX;
        while let Some(tid) = ready.pop_highest(&mut table) {
            let level = table.get(tid).priority().raw();
            assert!(level <= last);
            // Everything still queued is at most this urgent.
            if let Some(next) = ready.peek_priority() {
                assert!(next.raw() <= level);
            }
            last = level;
        }
    }

    #[test]
    fn test_wait_queue_pool() {
        let mut pool: WaitQueues<2> = WaitQueues::new();
        let q0 = pool.create().unwrap();
        let q1 = pool.create().unwrap();
        assert_ne!(q0, q1);
        assert_eq!(pool.create().err(), Some(KernelError::NoQueueSlot));
        assert!(pool.queue(q0).is_empty());
    }
}
