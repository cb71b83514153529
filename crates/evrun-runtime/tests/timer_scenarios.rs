//! End-to-end timer service scenarios: one-shot, parallel, restart,
//! cancel, repeat and resendable accounting, each against a live
//! scheduler task and real queues.
//!
//! Lower timing bounds are hard guarantees (a timer never fires early);
//! upper bounds are generous so loaded CI machines do not flake.

use std::sync::Arc;
use std::time::Instant;

use evrun_runtime::{
    dispatch, Event, EventHandler, EventQueue, ResendableTimer, TimerConfig, TimerService,
    TIMEOUT_NEVER,
};

/// Generous delivery slack for loaded machines, in milliseconds.
const SLACK_MS: u128 = 400;

fn start_service() -> TimerService {
    TimerService::start(TimerConfig::default()).expect("timer service failed to start")
}

#[test]
fn one_shot_fires_on_time_and_only_once() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();
    let timer = service.new_timer(None, &queue);

    let armed_at = Instant::now();
    timer.start(125, false).unwrap();

    let event = queue.get_with_timeout(5_000).expect("timer never fired");
    let elapsed = armed_at.elapsed().as_millis();

    assert!(timer.matches(&event));
    assert!(elapsed >= 125, "fired early: {} ms", elapsed);
    assert!(elapsed <= 125 + SLACK_MS, "fired late: {} ms", elapsed);
    assert!(timer.is_valid());

    // exactly one delivery
    assert!(queue.get_with_timeout(200).is_none());
}

#[test]
fn four_parallel_timers_deliver_in_deadline_order() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();

    let t1 = service.new_timer(None, &queue);
    let t2 = service.new_timer(None, &queue);
    let t3 = service.new_timer(None, &queue);
    let t4 = service.new_timer(None, &queue);

    let armed_at = Instant::now();
    t4.start(500, false).unwrap();
    t2.start(250, false).unwrap();
    t1.start(125, false).unwrap();
    t3.start(375, false).unwrap();

    let expected = [(&t1, 125u128), (&t2, 250), (&t3, 375), (&t4, 500)];
    for (timer, delay_ms) in expected {
        let event = queue.get_with_timeout(5_000).expect("missing delivery");
        let elapsed = armed_at.elapsed().as_millis();

        assert!(timer.matches(&event), "out-of-order delivery");
        assert!(timer.is_valid());
        assert!(elapsed >= delay_ms, "fired early: {} < {}", elapsed, delay_ms);
        assert!(elapsed <= delay_ms + SLACK_MS, "fired late: {} ms", elapsed);
    }

    assert!(queue.get_with_timeout(100).is_none());
}

#[test]
fn restart_supersedes_previous_arming() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();
    let timer = service.new_timer(None, &queue);

    let armed_at = Instant::now();
    timer.start(400, false).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(150));
    timer.start(400, false).unwrap();

    // nothing arrives from the superseded arming
    assert!(queue.get_with_timeout(200).is_none());

    let event = queue.get_with_timeout(5_000).expect("restart never fired");
    let elapsed = armed_at.elapsed().as_millis();

    assert!(timer.matches(&event));
    assert!(timer.is_valid());
    assert!(elapsed >= 550, "restarted timer fired early: {} ms", elapsed);
    assert!(queue.get_with_timeout(100).is_none());
}

#[test]
fn cancel_after_fire_invalidates_queued_delivery() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();
    let timer = service.new_timer(None, &queue);

    timer.start(100, false).unwrap();
    // let it fire and sit unreceived in the queue
    std::thread::sleep(std::time::Duration::from_millis(250));

    timer.cancel();
    timer.start(150, false).unwrap();

    let stale = queue.get_with_timeout(1_000).expect("stale delivery missing");
    assert!(timer.matches(&stale));
    assert!(!timer.is_valid(), "stale delivery passed the validity check");

    let live = queue.get_with_timeout(5_000).expect("restart never fired");
    assert!(timer.matches(&live));
    assert!(timer.is_valid());

    assert!(queue.get_with_timeout(100).is_none());
}

#[test]
fn cancel_is_idempotent_and_timer_restartable() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();
    let timer = service.new_timer(None, &queue);

    timer.start(200, false).unwrap();
    timer.cancel();
    timer.cancel();
    timer.cancel();

    // at most one delivery can surface, and it must read invalid
    if let Some(event) = queue.get_with_timeout(400) {
        assert!(timer.matches(&event));
        assert!(!timer.is_valid());
    }
    assert!(queue.get_with_timeout(100).is_none());

    // the timer is reusable after any number of cancels
    timer.start(50, false).unwrap();
    let event = queue.get_with_timeout(2_000).expect("restart never fired");
    assert!(timer.matches(&event));
    assert!(timer.is_valid());
}

#[test]
fn repeating_timer_keeps_its_period() {
    const PERIOD_MS: u128 = 125;
    const ROUNDS: usize = 10;

    let service = start_service();
    let queue = EventQueue::new(16).unwrap();
    let timer = service.new_timer(None, &queue);

    timer.start(PERIOD_MS as u32, true).unwrap();

    let mut first = None;
    let mut last = None;
    for round in 0..ROUNDS {
        let event = queue
            .get_with_timeout(5_000)
            .unwrap_or_else(|| panic!("repeat {} never arrived", round));
        assert!(timer.matches(&event));
        assert!(timer.is_valid());

        let now = Instant::now();
        first.get_or_insert(now);
        last = Some(now);
    }

    // Periods must not compound: rebasing on fire keeps drift bounded by
    // roughly one tick per round, not cumulative.
    let span = last.unwrap().duration_since(first.unwrap()).as_millis();
    let expected = PERIOD_MS * (ROUNDS as u128 - 1);
    assert!(span >= expected - 20, "periods compressed: {} ms", span);
    assert!(
        span <= expected + SLACK_MS + 20 * ROUNDS as u128,
        "cumulative drift: {} ms over {} rounds",
        span,
        ROUNDS
    );

    timer.cancel();
    // consume anything that fired before the cancel was observed
    while let Some(event) = queue.get_with_timeout(300) {
        assert!(timer.matches(&event));
        let _ = timer.is_valid();
    }
}

#[test]
fn resendable_accounting_over_resend_and_cancel() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();
    let rtimer = ResendableTimer::new(service.new_timer(None, &queue));

    // two sends and a cancel; every send comes back, none is valid
    rtimer.start(100).unwrap();
    rtimer.start(100).unwrap();
    rtimer.cancel();

    let mut receives = 0;
    let mut valid = 0;
    while let Some(event) = queue.get_with_timeout(600) {
        assert!(rtimer.matches(&event));
        receives += 1;
        if rtimer.receive() {
            valid += 1;
        }
    }

    assert_eq!(receives, 2, "one delivery per start");
    assert_eq!(valid, 0, "cancelled sends must all read invalid");
    assert!(!rtimer.is_valid());
}

#[test]
fn resendable_single_send_is_received_valid() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();
    let rtimer = ResendableTimer::new(service.new_timer(None, &queue));

    rtimer.start(75).unwrap();
    let event = queue.get_with_timeout(5_000).expect("send never came back");
    assert!(rtimer.matches(&event));
    assert!(rtimer.receive(), "sole send must be valid");

    // ledger is balanced again
    assert!(!rtimer.is_valid());
    assert!(queue.get_with_timeout(100).is_none());
}

// With `wake-timer` enabled only WAKE-flagged timers participate in the
// wake query; that variant lives in tests/wake_timer.rs.
#[cfg(not(feature = "wake-timer"))]
#[test]
fn wake_time_tracks_earliest_deadline() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();

    assert_eq!(service.wake_time(), evrun_runtime::TIME_NEVER_NATIVE);

    let far = service.new_timer(None, &queue);
    let near = service.new_timer(None, &queue);
    far.start(5_000, false).unwrap();
    near.start(1_000, false).unwrap();

    // give the scheduler a moment to take both armings in
    std::thread::sleep(std::time::Duration::from_millis(100));

    let wake = service.wake_time();
    let now = evrun_runtime::clock::now_native();
    assert!(wake != evrun_runtime::TIME_NEVER_NATIVE);
    assert!(wake >= now, "wake time in the past");
    assert!(
        wake <= now + evrun_core::time::ms_to_delay_native(1_000),
        "wake time ignores the nearer deadline"
    );

    far.cancel();
    near.cancel();
}

#[test]
fn dispatch_swallows_stale_timer_deliveries() {
    let service = start_service();
    let queue = EventQueue::new(8).unwrap();

    let handler: Arc<dyn EventHandler> = Arc::new(|_: &Event| 7);
    let timer = service.new_timer(Some(handler), &queue);

    timer.start(50, false).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(200));
    timer.cancel();
    timer.start(100, false).unwrap();

    // the fired-then-cancelled delivery is swallowed without reaching
    // any handler
    let stale = queue.get_with_timeout(1_000).expect("stale delivery missing");
    assert!(timer.matches(&stale));
    assert_eq!(dispatch(&stale, &|_: &Event| -1), 0);

    // the live delivery runs the timer's own handler
    let live = queue.get_with_timeout(5_000).expect("restart never fired");
    assert_eq!(dispatch(&live, &|_: &Event| -1), 7);
}

#[test]
fn timer_queue_is_reachable_and_bounded() {
    let service = start_service();
    assert_eq!(
        service.queue().capacity(),
        evrun_runtime::DEFAULT_MAX_TIMER_EVENTS + 1
    );
}

#[test]
fn get_with_timeout_never_blocks_until_delivery() {
    let service = start_service();
    let queue = EventQueue::new(4).unwrap();
    let timer = service.new_timer(None, &queue);

    timer.start(150, false).unwrap();
    let event = queue.get_with_timeout(TIMEOUT_NEVER).expect("blocking get");
    assert!(timer.matches(&event));
    assert!(timer.is_valid());
}
