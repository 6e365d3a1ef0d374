//! The scheduler and kernel control block
//!
//! [`Kernel`] is the entire kernel state in one explicitly-owned value: the
//! thread table, the ready queue, the wait queue pool, the virtual timer
//! set, kernel time, and the current/pending thread references. Every
//! operation takes `&mut self` and assumes the kernel lock is already held
//! (see [`crate::lock`]); tests construct plain instances and drive them
//! directly.
//!
//! The scheduling decision is split in two, the way the dispatcher needs it:
//! `evaluate` recomputes which thread *should* own the CPU (the pending
//! thread), and `dispatch` performs the context switch when pending differs
//! from current. Dispatch is deferred while in interrupt context or under
//! the scheduler lock and is re-run at `isr_exit` / the outermost
//! `sched_unlock`, so interrupt-context wakes take effect exactly at
//! interrupt return.

use tern_core::{
    Duration, Instant, KernelError, KResult, Priority, ThreadState, WakeReason,
};

use crate::fault::{fault, FaultKind};
use crate::port::Port;
use crate::queue::{QueueId, ReadyQueue, WaitQueues};
use crate::thread::{Tcb, ThreadConfig, ThreadId, ThreadTable};
use crate::timer::{TimerAction, TimerHandle, TimerKind, TimerSet};

/// Kernel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// Threads may be spawned; nothing runs yet
    Boot,
    /// Multi-threading has started
    Running,
}

/// The kernel control block
///
/// Const parameters fix the capacities at compile time: `THREADS` thread
/// slots, `TIMERS` armed timers, `QUEUES` wait queues. `P` supplies the
/// context-switch capability.
pub struct Kernel<P: Port, const THREADS: usize, const TIMERS: usize, const QUEUES: usize> {
    threads: ThreadTable<P::Context, THREADS>,
    ready: ReadyQueue,
    waits: WaitQueues<QUEUES>,
    timers: TimerSet<TIMERS>,
    now: Instant,
    current: Option<ThreadId>,
    pending: Option<ThreadId>,
    state: KernelState,
    /// Scheduler-lock (preemption disable) nesting depth
    lock_nesting: u8,
    /// Interrupt service nesting depth
    isr_nesting: u8,
}

impl<P: Port, const THREADS: usize, const TIMERS: usize, const QUEUES: usize>
    Kernel<P, THREADS, TIMERS, QUEUES>
{
    /// Create a kernel with no threads and time at zero
    pub const fn new() -> Self {
        Self {
            threads: ThreadTable::new(),
            ready: ReadyQueue::new(),
            waits: WaitQueues::new(),
            timers: TimerSet::new(),
            now: Instant::ZERO,
            current: None,
            pending: None,
            state: KernelState::Boot,
            lock_nesting: 0,
            isr_nesting: 0,
        }
    }

    // -- Thread lifecycle ---------------------------------------------------

    /// Create a thread; it starts `Ready`
    ///
    /// Slot exhaustion is a recoverable creation failure. After `start`,
    /// spawning a strictly higher-priority thread preempts the caller
    /// immediately.
    pub fn spawn(&mut self, config: ThreadConfig, context: P::Context) -> KResult<ThreadId> {
        let tid = self.threads.alloc(Tcb::new(config, context))?;
        self.ready.insert(&mut self.threads, tid);

        #[cfg(feature = "defmt")]
        defmt::trace!("spawn {=str} at {}", config.name, config.priority);

        if self.state == KernelState::Running {
            self.evaluate();
            self.dispatch();
        }
        Ok(tid)
    }

    /// Start multi-threading: switch into the highest-priority thread
    ///
    /// On a real target this hands the CPU to the first thread and the call
    /// never logically returns; with a recording port it simply returns.
    pub fn start(&mut self) {
        if self.state == KernelState::Running {
            fault(FaultKind::AlreadyStarted);
        }
        let first = match self.ready.pop_highest(&mut self.threads) {
            Some(tid) => tid,
            None => fault(FaultKind::ReadyQueueEmpty),
        };
        self.state = KernelState::Running;
        self.current = Some(first);
        self.pending = Some(first);
        let tcb = self.threads.get_mut(first);
        tcb.state = ThreadState::Running;
        P::switch(None, &mut tcb.context);
    }

    /// Terminate the current thread and switch away for good
    ///
    /// The slot stays occupied (its stack may still be live on a real
    /// target) until [`Self::reclaim`] releases it.
    pub fn exit_current(&mut self) {
        if self.isr_nesting > 0 {
            fault(FaultKind::BlockInInterrupt);
        }
        if self.lock_nesting > 0 {
            fault(FaultKind::BlockWhileLocked);
        }
        let cur = self.require_current();
        let tcb = self.threads.get_mut(cur);
        tcb.state = ThreadState::Terminated;
        tcb.wake_reason = None;
        self.evaluate();
        self.dispatch();
    }

    /// Release a terminated thread's slot for reuse
    pub fn reclaim(&mut self, tid: ThreadId) {
        if self.threads.get(tid).state != ThreadState::Terminated {
            fault(FaultKind::ReclaimNotTerminated);
        }
        self.threads.free(tid);
    }

    // -- Blocking and waking ------------------------------------------------

    /// Block the current thread on a wait queue, optionally with a timeout
    ///
    /// The thread is appended FIFO to the queue; with a timeout, a one-shot
    /// virtual timer is armed that will wake it if no explicit wake arrives
    /// first. Control returns to the caller only after some other path
    /// wakes the thread. Fatal from interrupt context or under the
    /// scheduler lock.
    pub fn suspend(&mut self, queue: QueueId, timeout: Option<Duration>) -> KResult<()> {
        let _ = self.waits.queue(queue); // validate before touching state
        if timeout.is_some() && self.timers.is_full() {
            return Err(KernelError::NoTimerSlot);
        }
        self.block_current(Some(queue), timeout);
        Ok(())
    }

    /// Block the current thread for a fixed number of ticks
    pub fn sleep(&mut self, duration: Duration) -> KResult<()> {
        if self.timers.is_full() {
            return Err(KernelError::NoTimerSlot);
        }
        self.block_current(None, Some(duration));
        Ok(())
    }

    /// Block the current thread until an explicit [`Self::wake`]
    pub fn wait(&mut self) {
        self.block_current(None, None);
    }

    /// Wake a waiting thread
    ///
    /// Unlinks it from its wait queue (if any), cancels its timeout timer
    /// (a no-op if the timeout already fired), and makes it ready. If the
    /// woken thread's priority strictly exceeds the running thread's, it
    /// preempts immediately; from interrupt context the switch happens at
    /// `isr_exit`.
    ///
    /// Waking a thread whose timeout just made it ready is the sanctioned
    /// timeout-versus-signal race and is a no-op. Waking any other
    /// non-waiting thread is a fatal contract violation.
    pub fn wake(&mut self, tid: ThreadId) {
        let (state, wake_reason) = {
            let tcb = self.threads.get(tid);
            (tcb.state, tcb.wake_reason)
        };
        match state {
            ThreadState::Waiting => {
                self.make_ready(tid, WakeReason::Signal);
                self.evaluate();
                self.dispatch();
            }
            ThreadState::Ready if wake_reason == Some(WakeReason::Timeout) => {
                // Lost the race against the thread's own timeout; the
                // timer already made it ready.
            }
            _ => fault(FaultKind::WakeNotWaiting),
        }
    }

    /// Wake the head waiter of a queue, if any
    ///
    /// This is the building block for semaphore posts and mutex releases:
    /// strict FIFO hand-off among equal-priority waiters.
    pub fn wake_one(&mut self, queue: QueueId) -> Option<ThreadId> {
        let head = self.waits.queue(queue).head()?;
        self.wake(head);
        Some(head)
    }

    /// Append an already-waiting thread to a wait queue
    ///
    /// Low-level hook for primitives that migrate waiters between queues.
    /// The thread must be `Waiting` and in no queue.
    pub fn insert_wait(&mut self, queue: QueueId, tid: ThreadId) {
        if self.threads.get(tid).state != ThreadState::Waiting {
            fault(FaultKind::NotWaiting);
        }
        self.waits.queue_mut(queue).push_back(&mut self.threads, tid);
        self.threads.get_mut(tid).waiting_on = Some(queue);
    }

    /// Detach a waiting thread from a specific queue without waking it
    ///
    /// Fatal if the thread is not in that queue. The thread stays
    /// `Waiting`; the caller re-parks or wakes it.
    pub fn remove_wait(&mut self, queue: QueueId, tid: ThreadId) {
        self.waits.queue_mut(queue).remove(&mut self.threads, tid);
        self.threads.get_mut(tid).waiting_on = None;
    }

    // -- Yielding and time slicing -------------------------------------------

    /// Hand the CPU to the next thread of the same priority
    ///
    /// The current thread is reinserted at the tail of its band, so its
    /// FIFO peers run first. When the current thread is alone at the
    /// highest ready priority this is a no-op: a lower-priority thread
    /// never runs over a ready higher-priority one.
    pub fn yield_now(&mut self) {
        if self.state != KernelState::Running {
            fault(FaultKind::NoCurrentThread);
        }
        self.rotate_current();
    }

    // -- Time ----------------------------------------------------------------

    /// Advance kernel time by one tick and fire everything that came due
    ///
    /// Called from the periodic time source, normally between `isr_enter`
    /// and `isr_exit`. Expired timers fire in deadline order (ties in
    /// arming order), the round-robin quantum policy runs, and the kernel
    /// reschedules.
    pub fn tick_advance(&mut self) {
        let target = self.now + Duration::from_ticks(1);
        self.advance_clock(target);
        self.quantum_tick();
        self.evaluate();
        self.dispatch();
    }

    /// Tickless variant: jump kernel time to an absolute instant
    ///
    /// Each timer that comes due in the jump fires with `now` equal to its
    /// own deadline, preserving deadline order. Fatal if `target` is in
    /// the past; kernel time never moves backwards.
    pub fn advance_to(&mut self, target: Instant) {
        if target < self.now {
            fault(FaultKind::NonMonotonicTime);
        }
        self.advance_clock(target);
        self.evaluate();
        self.dispatch();
    }

    // -- Virtual timers --------------------------------------------------------

    /// Arm a virtual timer at an absolute deadline
    pub fn arm_timer(
        &mut self,
        deadline: Instant,
        kind: TimerKind,
        action: TimerAction,
    ) -> KResult<TimerHandle> {
        self.timers.arm(deadline, kind, action)
    }

    /// Arm a virtual timer relative to the current time
    pub fn arm_timer_after(
        &mut self,
        after: Duration,
        kind: TimerKind,
        action: TimerAction,
    ) -> KResult<TimerHandle> {
        self.timers.arm(self.now + after, kind, action)
    }

    /// Cancel a timer; returns `false` (a no-op) if it already fired
    pub fn cancel_timer(&mut self, handle: TimerHandle) -> bool {
        self.timers.cancel(handle)
    }

    /// Check whether a timer is still armed
    pub fn timer_is_armed(&self, handle: TimerHandle) -> bool {
        self.timers.is_armed(handle)
    }

    // -- Interrupt context and scheduler locking -------------------------------

    /// Note entry into an interrupt service routine
    ///
    /// While inside, context switches are deferred; the switch decided by
    /// wakes and ticks happens at the matching `isr_exit`.
    pub fn isr_enter(&mut self) {
        self.isr_nesting += 1;
    }

    /// Note exit from an interrupt service routine
    ///
    /// The outermost exit performs any deferred context switch, which is
    /// how an interrupt return lands in a freshly-woken thread.
    pub fn isr_exit(&mut self) {
        if self.isr_nesting == 0 {
            fault(FaultKind::IsrUnderflow);
        }
        self.isr_nesting -= 1;
        if self.isr_nesting == 0 {
            self.dispatch();
        }
    }

    /// Disable preemption; nests
    pub fn sched_lock(&mut self) {
        self.lock_nesting += 1;
    }

    /// Re-enable preemption; the outermost unlock reschedules
    pub fn sched_unlock(&mut self) {
        if self.lock_nesting == 0 {
            fault(FaultKind::SchedLockUnderflow);
        }
        self.lock_nesting -= 1;
        if self.lock_nesting == 0 {
            self.dispatch();
        }
    }

    // -- Wait queues ------------------------------------------------------------

    /// Allocate a wait queue for a synchronization primitive
    pub fn create_queue(&mut self) -> KResult<QueueId> {
        self.waits.create()
    }

    // -- Read accessors -----------------------------------------------------------

    /// Current kernel time
    pub fn now(&self) -> Instant {
        self.now
    }

    /// The running thread, once started
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current
    }

    /// Kernel lifecycle state
    pub fn state(&self) -> KernelState {
        self.state
    }

    /// Scheduling state of a thread
    pub fn thread_state(&self, tid: ThreadId) -> ThreadState {
        self.threads.get(tid).state
    }

    /// Priority of a thread
    pub fn thread_priority(&self, tid: ThreadId) -> Priority {
        self.threads.get(tid).priority
    }

    /// Name of a thread
    pub fn thread_name(&self, tid: ThreadId) -> &'static str {
        self.threads.get(tid).name
    }

    /// Why a thread last left `Waiting`; `None` once it blocks again
    pub fn wake_reason(&self, tid: ThreadId) -> Option<WakeReason> {
        self.threads.get(tid).wake_reason
    }

    /// Check whether the kernel is currently servicing an interrupt
    pub fn in_interrupt(&self) -> bool {
        self.isr_nesting > 0
    }

    // -- Internals ------------------------------------------------------------------

    fn require_current(&self) -> ThreadId {
        match self.current {
            Some(cur) => cur,
            None => fault(FaultKind::NoCurrentThread),
        }
    }

    /// Recompute the pending thread: the ready-queue head preempts the
    /// current thread only with strictly higher priority.
    fn evaluate(&mut self) {
        let head = self.ready.peek();
        self.pending = match self.current {
            Some(cur) if self.threads.get(cur).state == ThreadState::Running => {
                let current_priority = self.threads.get(cur).priority;
                match head {
                    Some(candidate)
                        if self.threads.get(candidate).priority > current_priority =>
                    {
                        Some(candidate)
                    }
                    _ => Some(cur),
                }
            }
            _ => head,
        };
    }

    /// Perform the context switch decided by `evaluate`, unless deferred
    fn dispatch(&mut self) {
        if self.state != KernelState::Running || self.lock_nesting > 0 || self.isr_nesting > 0 {
            return;
        }
        let next = match self.pending {
            Some(next) => next,
            // No runnable thread anywhere: the idle thread is missing.
            None => fault(FaultKind::ReadyQueueEmpty),
        };
        if Some(next) == self.current {
            return;
        }
        if let Some(cur) = self.current {
            let tcb = self.threads.get_mut(cur);
            if tcb.state == ThreadState::Running {
                tcb.state = ThreadState::Ready;
                self.ready.insert(&mut self.threads, cur);
            }
        }
        self.ready.remove(&mut self.threads, next);
        self.threads.get_mut(next).state = ThreadState::Running;
        let previous = self.current;
        self.current = Some(next);

        #[cfg(feature = "defmt")]
        defmt::trace!("switch to {=str}", self.threads.get(next).name);

        match previous {
            Some(prev) if prev != next => {
                let (from, to) = self.threads.pair_mut(prev, next);
                P::switch(Some(&mut from.context), &mut to.context);
            }
            _ => {
                let to = self.threads.get_mut(next);
                P::switch(None, &mut to.context);
            }
        }
    }

    fn block_current(&mut self, waiting_on: Option<QueueId>, timeout: Option<Duration>) {
        if self.isr_nesting > 0 {
            fault(FaultKind::BlockInInterrupt);
        }
        if self.lock_nesting > 0 {
            fault(FaultKind::BlockWhileLocked);
        }
        let cur = self.require_current();
        {
            let tcb = self.threads.get_mut(cur);
            tcb.state = ThreadState::Waiting;
            tcb.wake_reason = None;
            tcb.waiting_on = waiting_on;
        }
        if let Some(qid) = waiting_on {
            self.waits.queue_mut(qid).push_back(&mut self.threads, cur);
        }
        if let Some(after) = timeout {
            let deadline = self.now + after;
            match self
                .timers
                .arm(deadline, TimerKind::OneShot, TimerAction::WakeThread(cur))
            {
                Ok(handle) => self.threads.get_mut(cur).timeout = Some(handle),
                // Capacity was checked before any state change.
                Err(_) => fault(FaultKind::TimerSetOverflow),
            }
        }
        self.evaluate();
        self.dispatch();
    }

    /// Move a waiting thread into the ready queue, recording why
    fn make_ready(&mut self, tid: ThreadId, reason: WakeReason) {
        let (waiting_on, timeout) = {
            let tcb = self.threads.get_mut(tid);
            (tcb.waiting_on.take(), tcb.timeout.take())
        };
        if let Some(qid) = waiting_on {
            self.waits.queue_mut(qid).remove(&mut self.threads, tid);
        }
        if let Some(handle) = timeout {
            // No-op when the timeout fired first.
            self.timers.cancel(handle);
        }
        let tcb = self.threads.get_mut(tid);
        tcb.state = ThreadState::Ready;
        tcb.wake_reason = Some(reason);
        self.ready.insert(&mut self.threads, tid);
    }

    /// Fire every timer due at or before `target`, in deadline order
    ///
    /// Kernel time steps onto each due deadline before its entry fires, so
    /// every action observes `now` at its own deadline and a periodic entry
    /// re-armed inside the jump comes due again in the same pass. Periodic
    /// entries are re-inserted before their action runs, keeping the sorted
    /// invariant across re-arms from the action itself.
    fn advance_clock(&mut self, target: Instant) {
        while let Some(entry) = self.timers.pop_due(target) {
            if entry.deadline > self.now {
                self.now = entry.deadline;
            }
            // A zero period would come due again in this same pass and
            // never make progress; such an entry fires once.
            if let TimerKind::Periodic(period) = entry.kind {
                if !period.is_zero() {
                    self.timers.rearm(entry, period);
                }
            }
            match entry.action {
                TimerAction::WakeThread(tid) => self.wake_timeout(tid),
                TimerAction::Callback(callback, arg) => callback(arg),
            }
        }
        self.now = target;
    }

    /// A timeout timer fired for `tid`
    fn wake_timeout(&mut self, tid: ThreadId) {
        if self.threads.get(tid).state != ThreadState::Waiting {
            // The explicit wake won the race; nothing to do.
            return;
        }
        self.make_ready(tid, WakeReason::Timeout);
        self.evaluate();
    }

    /// Reinsert the current thread at the tail of its band and hand the
    /// CPU to the new head of the ready queue.
    fn rotate_current(&mut self) {
        let cur = self.require_current();
        self.threads.get_mut(cur).state = ThreadState::Ready;
        self.ready.insert(&mut self.threads, cur);
        self.evaluate();
        if self.pending == Some(cur) {
            // Alone at the highest ready priority: nothing to switch to.
            self.ready.remove(&mut self.threads, cur);
            self.threads.get_mut(cur).state = ThreadState::Running;
        } else {
            self.dispatch();
        }
    }

    /// Round-robin policy hook, run once per tick
    ///
    /// Only threads configured with a non-zero quantum are sliced, and only
    /// while a same-priority peer is ready. Slicing pauses while the
    /// scheduler lock is held.
    fn quantum_tick(&mut self) {
        if self.state != KernelState::Running || self.lock_nesting > 0 {
            return;
        }
        let Some(cur) = self.current else {
            return;
        };
        let (reload, priority, state) = {
            let tcb = self.threads.get(cur);
            (tcb.quantum_reload, tcb.priority, tcb.state)
        };
        if reload == 0 || state != ThreadState::Running {
            return;
        }
        if self.ready.band_is_empty(priority) {
            // No peer to rotate to; keep the quantum intact.
            return;
        }
        let tcb = self.threads.get_mut(cur);
        tcb.quantum = tcb.quantum.saturating_sub(1);
        if tcb.quantum == 0 {
            tcb.quantum = reload;
            self.rotate_current();
        }
    }
}

impl<P: Port, const THREADS: usize, const TIMERS: usize, const QUEUES: usize> Default
    for Kernel<P, THREADS, TIMERS, QUEUES>
{
    fn default() -> Self {
        Self::new()
    }
}
