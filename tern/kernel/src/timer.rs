//! Virtual timers: a deadline-sorted set of one-shot and periodic callbacks
//!
//! Armed timers are kept sorted by `(deadline, arming order)`, so the head
//! of the set always holds the nearest deadline and simultaneous deadlines
//! fire in the order they were armed. Expiry runs with the kernel lock held
//! at tick time; actions must be short and must not block: typically "wake
//! this thread" or a plain function call that signals a flag.

use heapless::Vec;
use tern_core::{Duration, Instant, KernelError, KResult};

use crate::fault::{fault, FaultKind};
use crate::thread::ThreadId;

/// Handle to an armed timer
///
/// Handles are never reused: each arming gets a fresh id, so a stale handle
/// can at worst name a timer that already fired, which every operation here
/// treats as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u32);

#[cfg(feature = "defmt")]
impl defmt::Format for TimerHandle {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "TimerHandle({})", self.0);
    }
}

/// One-shot or periodic behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fire once and disappear
    OneShot,
    /// Fire, then re-arm at `deadline + period`
    Periodic(Duration),
}

/// What happens when a timer fires
#[derive(Debug, Clone, Copy)]
pub enum TimerAction {
    /// Wake a thread blocked in a timed wait
    WakeThread(ThreadId),
    /// Invoke a plain function with an opaque argument
    ///
    /// Runs under the kernel lock at interrupt priority: keep it short,
    /// never block.
    Callback(fn(usize), usize),
}

/// One armed timer
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimerEntry {
    pub(crate) id: u32,
    pub(crate) deadline: Instant,
    pub(crate) seq: u32,
    pub(crate) kind: TimerKind,
    pub(crate) action: TimerAction,
}

/// The active timer set
///
/// Fixed capacity `T`; arming when full is the recoverable
/// [`KernelError::NoTimerSlot`].
pub struct TimerSet<const T: usize> {
    armed: Vec<TimerEntry, T>,
    next_id: u32,
    next_seq: u32,
}

impl<const T: usize> TimerSet<T> {
    pub(crate) const fn new() -> Self {
        Self {
            armed: Vec::new(),
            next_id: 0,
            next_seq: 0,
        }
    }

    /// Arm a timer at an absolute deadline
    pub fn arm(
        &mut self,
        deadline: Instant,
        kind: TimerKind,
        action: TimerAction,
    ) -> KResult<TimerHandle> {
        if self.armed.is_full() {
            return Err(KernelError::NoTimerSlot);
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let entry = TimerEntry {
            id,
            deadline,
            seq: self.take_seq(),
            kind,
            action,
        };
        self.insert_sorted(entry);
        Ok(TimerHandle(id))
    }

    /// Disarm a timer; returns `false` (a no-op) if it already fired
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.armed.iter().position(|entry| entry.id == handle.0) {
            Some(index) => {
                self.armed.remove(index);
                true
            }
            None => false,
        }
    }

    /// Check whether a timer is still armed
    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.armed.iter().any(|entry| entry.id == handle.0)
    }

    /// Deadline of the nearest armed timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed.first().map(|entry| entry.deadline)
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// Check whether no timer is armed
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Capacity of the set
    pub const fn capacity(&self) -> usize {
        T
    }

    /// Check whether the set has no room for another timer
    pub fn is_full(&self) -> bool {
        self.armed.is_full()
    }

    /// Pop the head entry if it is due at `now`
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<TimerEntry> {
        if self.armed.first()?.deadline <= now {
            Some(self.armed.remove(0))
        } else {
            None
        }
    }

    /// Re-insert a periodic entry one period later, keeping its handle
    pub(crate) fn rearm(&mut self, mut entry: TimerEntry, period: Duration) {
        entry.deadline += period;
        entry.seq = self.take_seq();
        self.insert_sorted(entry);
    }

    fn take_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    fn insert_sorted(&mut self, entry: TimerEntry) {
        let position = self
            .armed
            .partition_point(|e| (e.deadline, e.seq) <= (entry.deadline, entry.seq));
        if self.armed.insert(position, entry).is_err() {
            // Callers check capacity (or just freed a slot) first.
            fault(FaultKind::TimerSetOverflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(_: usize) {}

    fn at(tick: u64) -> Instant {
        Instant::from_ticks(tick)
    }

    #[test]
    fn test_head_holds_nearest_deadline() {
        let mut set: TimerSet<4> = TimerSet::new();
        set.arm(at(9), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();
        set.arm(at(3), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();
        set.arm(at(6), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();

        assert_eq!(set.next_deadline(), Some(at(3)));
        assert_eq!(set.pop_due(at(3)).unwrap().deadline, at(3));
        assert_eq!(set.next_deadline(), Some(at(6)));
        // Not due yet.
        assert!(set.pop_due(at(5)).is_none());
    }

    #[test]
    fn test_ties_fire_in_arming_order() {
        let mut set: TimerSet<4> = TimerSet::new();
        let first = set
            .arm(at(5), TimerKind::OneShot, TimerAction::Callback(nop, 1))
            .unwrap();
        let second = set
            .arm(at(5), TimerKind::OneShot, TimerAction::Callback(nop, 2))
            .unwrap();
        assert_ne!(first, second);

        let a = set.pop_due(at(5)).unwrap();
        let b = set.pop_due(at(5)).unwrap();
        assert!(a.seq < b.seq);
        assert!(matches!(a.action, TimerAction::Callback(_, 1)));
        assert!(matches!(b.action, TimerAction::Callback(_, 2)));
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut set: TimerSet<4> = TimerSet::new();
        let handle = set
            .arm(at(2), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();

        assert!(set.is_armed(handle));
        assert!(set.pop_due(at(2)).is_some());
        assert!(!set.is_armed(handle));
        assert!(!set.cancel(handle));
    }

    #[test]
    fn test_cancel_keeps_order() {
        let mut set: TimerSet<4> = TimerSet::new();
        let _a = set
            .arm(at(1), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();
        let b = set
            .arm(at(2), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();
        let _c = set
            .arm(at(3), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();

        assert!(set.cancel(b));
        assert_eq!(set.pop_due(at(10)).unwrap().deadline, at(1));
        assert_eq!(set.pop_due(at(10)).unwrap().deadline, at(3));
        assert!(set.is_empty());
    }

    #[test]
    fn test_periodic_rearm_preserves_sort_and_handle() {
        let mut set: TimerSet<4> = TimerSet::new();
        let period = Duration::from_ticks(10);
        let handle = set
            .arm(at(10), TimerKind::Periodic(period), TimerAction::Callback(nop, 0))
            .unwrap();
        set.arm(at(15), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();

        let entry = set.pop_due(at(10)).unwrap();
        set.rearm(entry, period);

        // Head is now the one-shot at 15, then the periodic again at 20.
        assert_eq!(set.next_deadline(), Some(at(15)));
        assert!(set.is_armed(handle));
        assert!(set.cancel(handle));
    }

    #[test]
    fn test_exhaustion_is_recoverable() {
        let mut set: TimerSet<2> = TimerSet::new();
        set.arm(at(1), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();
        set.arm(at(2), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();
        assert_eq!(
            set.arm(at(3), TimerKind::OneShot, TimerAction::Callback(nop, 0))
                .err(),
            Some(KernelError::NoTimerSlot)
        );
    }
}
