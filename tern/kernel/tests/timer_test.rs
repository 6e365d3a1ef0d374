//! Virtual timers driven through the kernel: callback order across a
//! tickless jump, periodic re-arming, cancellation, and exhaustion.

use std::sync::atomic::{AtomicUsize, Ordering};

use tern_kernel::{
    Duration, Instant, Kernel, KernelError, Port, Priority, ThreadConfig, TimerAction, TimerKind,
};

struct TestPort;

impl Port for TestPort {
    type Context = ();

    fn switch(_from: Option<&mut ()>, _to: &mut ()) {}
}

type TestKernel = Kernel<TestPort, 4, 4, 2>;

fn boot() -> TestKernel {
    let mut kernel = TestKernel::new();
    kernel
        .spawn(
            ThreadConfig::new("idle", Priority::new_unchecked(0)),
            (),
        )
        .unwrap();
    kernel
        .spawn(
            ThreadConfig::new("main", Priority::new_unchecked(3)),
            (),
        )
        .unwrap();
    kernel.start();
    kernel
}

fn at(tick: u64) -> Instant {
    Instant::from_ticks(tick)
}

// Each test records into its own static; tests run in parallel.
static JUMP_ORDER: AtomicUsize = AtomicUsize::new(0);

fn record_jump(arg: usize) {
    let prev = JUMP_ORDER.load(Ordering::Relaxed);
    JUMP_ORDER.store(prev * 10 + arg, Ordering::Relaxed);
}

#[test]
fn test_callbacks_fire_in_deadline_order_across_jump() {
    let mut kernel = boot();
    kernel
        .arm_timer(at(5), TimerKind::OneShot, TimerAction::Callback(record_jump, 5))
        .unwrap();
    kernel
        .arm_timer(at(3), TimerKind::OneShot, TimerAction::Callback(record_jump, 3))
        .unwrap();

    // A single jump past both deadlines still fires them in order.
    kernel.advance_to(at(10));
    assert_eq!(JUMP_ORDER.load(Ordering::Relaxed), 35);
    assert_eq!(kernel.now(), at(10));
}

static PERIODIC_FIRES: AtomicUsize = AtomicUsize::new(0);

fn count_periodic(_arg: usize) {
    PERIODIC_FIRES.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn test_periodic_timer_rearms() {
    let mut kernel = boot();
    let handle = kernel
        .arm_timer(
            at(2),
            TimerKind::Periodic(Duration::from_ticks(2)),
            TimerAction::Callback(count_periodic, 0),
        )
        .unwrap();

    for _ in 0..6 {
        kernel.tick_advance();
    }
    // Fired at 2, 4 and 6, and is armed again for 8.
    assert_eq!(PERIODIC_FIRES.load(Ordering::Relaxed), 3);
    assert!(kernel.timer_is_armed(handle));

    assert!(kernel.cancel_timer(handle));
    kernel.advance_to(at(20));
    assert_eq!(PERIODIC_FIRES.load(Ordering::Relaxed), 3);
}

static CANCELLED_FIRES: AtomicUsize = AtomicUsize::new(0);

fn count_cancelled(_arg: usize) {
    CANCELLED_FIRES.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn test_cancel_before_deadline_suppresses_fire() {
    let mut kernel = boot();
    let handle = kernel
        .arm_timer_after(
            Duration::from_ticks(4),
            TimerKind::OneShot,
            TimerAction::Callback(count_cancelled, 0),
        )
        .unwrap();

    assert!(kernel.timer_is_armed(handle));
    assert!(kernel.cancel_timer(handle));
    assert!(!kernel.timer_is_armed(handle));
    // Cancelling again reports the timer as already gone.
    assert!(!kernel.cancel_timer(handle));

    kernel.advance_to(at(10));
    assert_eq!(CANCELLED_FIRES.load(Ordering::Relaxed), 0);
}

static CATCH_UP_FIRES: AtomicUsize = AtomicUsize::new(0);

fn count_catch_up(_arg: usize) {
    CATCH_UP_FIRES.fetch_add(1, Ordering::Relaxed);
}

#[test]
fn test_periodic_timer_catches_up_in_one_jump() {
    let mut kernel = boot();
    kernel
        .arm_timer(
            at(2),
            TimerKind::Periodic(Duration::from_ticks(2)),
            TimerAction::Callback(count_catch_up, 0),
        )
        .unwrap();

    // A single tickless jump covers deadlines 2, 4, 6, 8 and 10: each
    // re-arm comes due again within the same pass.
    kernel.advance_to(at(11));
    assert_eq!(CATCH_UP_FIRES.load(Ordering::Relaxed), 5);
    assert_eq!(kernel.now(), at(11));
}

fn nop(_arg: usize) {}

#[test]
fn test_timer_exhaustion_is_recoverable() {
    let mut kernel = boot();
    for tick in 1..=4 {
        kernel
            .arm_timer(at(tick), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .unwrap();
    }
    assert_eq!(
        kernel
            .arm_timer(at(5), TimerKind::OneShot, TimerAction::Callback(nop, 0))
            .err(),
        Some(KernelError::NoTimerSlot)
    );

    // A timed block must fail up front, before the thread changes state.
    assert_eq!(
        kernel.sleep(Duration::from_ticks(1)).err(),
        Some(KernelError::NoTimerSlot)
    );
    let current = kernel.current_thread().unwrap();
    assert_eq!(kernel.thread_name(current), "main");
}
