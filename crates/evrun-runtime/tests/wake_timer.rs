//! Wake-timer tracking: only WAKE-flagged timers feed the host's
//! next-wake-time query.

#![cfg(feature = "wake-timer")]

use evrun_core::time::ms_to_delay_native;
use evrun_runtime::{clock, EventQueue, TimerConfig, TimerService, TIME_NEVER_NATIVE};

#[test]
fn only_wake_flagged_timers_feed_the_wake_query() {
    let service = TimerService::start(TimerConfig::default()).unwrap();
    let queue = EventQueue::new(8).unwrap();

    // an ordinary timer does not contribute
    let plain = service.new_timer(None, &queue);
    plain.start(500, false).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(100));
    assert_eq!(service.wake_time(), TIME_NEVER_NATIVE);

    // a wake timer does
    let wake = service.new_timer(None, &queue);
    wake.set_wake(true);
    wake.start(2_000, false).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(100));

    let wake_at = service.wake_time();
    let now = clock::now_native();
    assert!(wake_at != TIME_NEVER_NATIVE);
    assert!(wake_at >= now);
    assert!(wake_at <= now + ms_to_delay_native(2_000));

    // the wake query clears once the wake timer is gone
    wake.cancel();
    plain.cancel();
    std::thread::sleep(std::time::Duration::from_millis(100));
    assert_eq!(service.wake_time(), TIME_NEVER_NATIVE);
}

#[test]
fn earliest_of_several_wake_timers_wins() {
    let service = TimerService::start(TimerConfig::default()).unwrap();
    let queue = EventQueue::new(8).unwrap();

    let near = service.new_timer(None, &queue);
    let far = service.new_timer(None, &queue);
    near.set_wake(true);
    far.set_wake(true);

    far.start(5_000, false).unwrap();
    near.start(1_000, false).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(100));

    let wake_at = service.wake_time();
    let now = clock::now_native();
    assert!(wake_at <= now + ms_to_delay_native(1_000));

    near.cancel();
    far.cancel();
}
