use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::callbacks::{DurationMs, Timeout, TimeoutId};

/// A timeout that records what was scheduled on it instead of measuring
/// time, so tests can fire expiries by hand.
#[derive(Default)]
struct FakeTimeout {
    scheduled: Rc<RefCell<Option<(DurationMs, TimeoutId)>>>,
}

impl FakeTimeout {
    fn new() -> (Box<dyn Timeout>, Rc<RefCell<Option<(DurationMs, TimeoutId)>>>) {
        let scheduled = Rc::new(RefCell::new(None));
        (
            Box::new(FakeTimeout {
                scheduled: Rc::clone(&scheduled),
            }),
            scheduled,
        )
    }
}

impl Timeout for FakeTimeout {
    fn start(&mut self, duration: DurationMs, timeout_id: TimeoutId) {
        *self.scheduled.borrow_mut() = Some((duration, timeout_id));
    }

    fn stop(&mut self) {
        *self.scheduled.borrow_mut() = None;
    }
}

#[test]
fn test_timer_fires_and_backs_off_exponentially() {
    let mut manager = TimerManager::new();
    let (timeout, scheduled) = FakeTimeout::new();
    let id = manager.create_timer("t3-rtx", timeout, TimerOptions::new(500));

    manager.start(id);
    let (duration, timeout_id) = scheduled.borrow().expect("should be scheduled");
    assert_eq!(duration, 500);

    assert_eq!(manager.handle_timeout(timeout_id), Some(id));
    assert_eq!(manager.expiration_count(id), 1);
    manager.reschedule(id, None);

    let (duration, timeout_id) = scheduled.borrow().expect("should be rescheduled");
    assert_eq!(duration, 1000, "second arming doubles");

    assert_eq!(manager.handle_timeout(timeout_id), Some(id));
    manager.reschedule(id, None);
    let (duration, _) = scheduled.borrow().expect("should be rescheduled");
    assert_eq!(duration, 2000, "third arming doubles again");
}

#[test]
fn test_fixed_backoff_keeps_duration() {
    let mut manager = TimerManager::new();
    let (timeout, scheduled) = FakeTimeout::new();
    let id = manager.create_timer("heartbeat", timeout, TimerOptions::fixed(5000));

    manager.start(id);
    for _ in 0..3 {
        let (duration, timeout_id) = scheduled.borrow().expect("scheduled");
        assert_eq!(duration, 5000);
        assert_eq!(manager.handle_timeout(timeout_id), Some(id));
        manager.reschedule(id, None);
    }
}

#[test]
fn test_stale_generation_is_discarded() {
    let mut manager = TimerManager::new();
    let (timeout, scheduled) = FakeTimeout::new();
    let id = manager.create_timer("t1-init", timeout, TimerOptions::new(1000));

    manager.start(id);
    let (_, stale_id) = scheduled.borrow().expect("scheduled");

    // The restart bumps the generation; an expiry delivered for the old
    // incarnation must be ignored.
    manager.restart(id);
    assert_eq!(manager.handle_timeout(stale_id), None);
    assert_eq!(manager.expiration_count(id), 0);

    let (_, fresh_id) = scheduled.borrow().expect("scheduled");
    assert_eq!(manager.handle_timeout(fresh_id), Some(id));
}

#[test]
fn test_stopped_timer_does_not_fire() {
    let mut manager = TimerManager::new();
    let (timeout, scheduled) = FakeTimeout::new();
    let id = manager.create_timer("delayed-ack", timeout, TimerOptions::fixed(200));

    manager.start(id);
    let (_, timeout_id) = scheduled.borrow().expect("scheduled");
    manager.stop(id);
    assert!(scheduled.borrow().is_none(), "stop reaches the primitive");
    assert_eq!(manager.handle_timeout(timeout_id), None);
}

#[test]
fn test_max_restarts_stops_the_timer() {
    let mut manager = TimerManager::new();
    let (timeout, scheduled) = FakeTimeout::new();
    let id = manager.create_timer(
        "t1-init",
        timeout,
        TimerOptions::new(1000).with_max_restarts(2),
    );

    manager.start(id);
    for expected_running in [true, true, false] {
        let (_, timeout_id) = scheduled.borrow().expect("scheduled");
        scheduled.borrow_mut().take();
        assert_eq!(manager.handle_timeout(timeout_id), Some(id));
        assert_eq!(manager.is_running(id), expected_running);
        manager.reschedule(id, None);
        if !expected_running {
            assert!(
                scheduled.borrow().is_none(),
                "exhausted timer must not re-arm"
            );
        }
    }
}

#[test]
fn test_new_duration_from_handler_is_used() {
    let mut manager = TimerManager::new();
    let (timeout, scheduled) = FakeTimeout::new();
    let id = manager.create_timer("heartbeat", timeout, TimerOptions::fixed(5000));

    manager.start(id);
    let (_, timeout_id) = scheduled.borrow().expect("scheduled");
    assert_eq!(manager.handle_timeout(timeout_id), Some(id));
    manager.reschedule(id, Some(5120));
    let (duration, _) = scheduled.borrow().expect("scheduled");
    assert_eq!(duration, 5120);
}

#[test]
fn test_restart_from_handler_wins_over_reschedule() {
    let mut manager = TimerManager::new();
    let (timeout, scheduled) = FakeTimeout::new();
    let id = manager.create_timer("reconfig", timeout, TimerOptions::new(300));

    manager.start(id);
    let (_, timeout_id) = scheduled.borrow().expect("scheduled");
    assert_eq!(manager.handle_timeout(timeout_id), Some(id));

    // The handler restarts the timer itself; the trailing reschedule must
    // not arm it a second time.
    manager.restart(id);
    let armed = scheduled.borrow().expect("scheduled");
    manager.reschedule(id, None);
    assert_eq!(scheduled.borrow().expect("scheduled"), armed);
}
