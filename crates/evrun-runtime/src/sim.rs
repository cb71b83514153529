//! Simulated time
//!
//! A paused-clock overlay for deterministic testing. While paused, the
//! clock returned by [`crate::clock::now_native`] is frozen;
//! [`TimerService::advance_time_ms`](crate::timer::TimerService) steps it
//! forward explicitly, processing every timer deadline and every
//! in-flight event on the way.
//!
//! Progress is tracked by a single process-wide outstanding-event
//! counter: every post to a counting queue increments it, and every get
//! decrements it lazily on the consumer's next get, so an event counts as
//! outstanding while its consumer is still processing it. Virtual time
//! only moves when the counter reads zero, i.e. when every event-driven
//! task is blocked waiting. Queues used purely for synchronization must
//! opt out with [`crate::queue::EventQueue::disable_counting`] or they
//! stall the advance forever.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, OnceLock};

use evrun_core::error::{Error, Result};
use evrun_core::evlog_debug;
use evrun_core::log::Region;
use evrun_core::time::{ms_to_native, TimeMs, TimeNative, TIMEOUT_NEVER};

use crate::clock;
use crate::queue::EventQueue;
use crate::timer::event::TimerEvent;
use crate::timer::TimerService;

struct SimTimeInfo {
    /// Raw time when `init` ran; subtracted so simulated time starts at 0.
    real_time_when_started: TimeNative,
    /// Raw time of the most recent pause.
    real_time_when_paused: TimeNative,
    /// Virtual time the current advance is heading for.
    advance_target: TimeNative,
    /// Accumulated paused real time, hidden from the simulated clock.
    sim_time_delay: i64,
    time_paused: bool,
}

static SIM: OnceLock<Mutex<SimTimeInfo>> = OnceLock::new();

/// Process-wide outstanding-event counter.
static OUTSTANDING: AtomicI32 = AtomicI32::new(0);

/// Initialize simulated time. Call once, before the timer service starts.
pub fn init(start_paused: bool) {
    let now = clock::raw_ticks();
    let _ = SIM.set(Mutex::new(SimTimeInfo {
        real_time_when_started: now,
        real_time_when_paused: now,
        advance_target: 0,
        sim_time_delay: 0,
        time_paused: start_paused,
    }));
}

/// Whether time is currently paused.
pub fn is_paused() -> bool {
    SIM.get().is_some_and(|s| s.lock().unwrap().time_paused)
}

/// Freeze the simulated clock at the current time.
pub fn pause() {
    if let Some(sim) = SIM.get() {
        let now = clock::raw_ticks();
        let mut info = sim.lock().unwrap();
        if !info.time_paused {
            info.real_time_when_paused = now;
            info.time_paused = true;
        }
    }
}

/// Resume the simulated clock. The paused interval is hidden, so
/// simulated time continues from where it stopped.
pub fn unpause() {
    if let Some(sim) = SIM.get() {
        let now = clock::raw_ticks();
        let mut info = sim.lock().unwrap();
        if info.time_paused {
            // Advances push the pause point ahead of real time, so this
            // delta can be negative: virtual time then leads real time.
            info.sim_time_delay += now as i64 - info.real_time_when_paused as i64;
            info.time_paused = false;
        }
    }
}

/// Map a raw tick reading into the simulated domain.
pub(crate) fn adjusted_now(raw: TimeNative) -> TimeNative {
    match SIM.get() {
        None => raw,
        Some(sim) => {
            let info = sim.lock().unwrap();
            let t = if info.time_paused {
                info.real_time_when_paused
            } else {
                raw
            };
            (t as i64 - info.sim_time_delay - info.real_time_when_started as i64).max(0) as u64
        }
    }
}

pub(crate) fn advance_target() -> TimeNative {
    SIM.get().map_or(0, |s| s.lock().unwrap().advance_target)
}

/// Move the frozen clock forward by `ticks`. Scheduler-side step of the
/// advance loop.
pub(crate) fn step_paused_time(ticks: TimeNative) {
    if let Some(sim) = SIM.get() {
        let mut info = sim.lock().unwrap();
        info.real_time_when_paused += ticks;
    }
}

/// Advance simulated time by `ms`, returning once every timer deadline in
/// the window has fired and every in-flight event has been processed.
///
/// Valid only while time is paused; fails with [`Error::BadState`]
/// otherwise.
pub(crate) fn advance(service: &TimerService, ms: TimeMs) -> Result<()> {
    let sim = SIM.get().ok_or(Error::BadState)?;
    if !sim.lock().unwrap().time_paused {
        return Err(Error::BadState);
    }

    let target = clock::now_native() + ms_to_native(ms);
    sim.lock().unwrap().advance_target = target;
    evlog_debug!(Region::Sim, "advancing {} ms to {}", ms, target);

    // The advance event is never dispatched, only echoed back to us once
    // the scheduler has walked virtual time to the target.
    let echo_queue = EventQueue::new(1)?;
    let advance_ev = TimerEvent::new_advance(std::sync::Arc::downgrade(&service.shared), &echo_queue);
    advance_ev.start(0, false)?;

    let result = echo_queue.get_with_timeout(TIMEOUT_NEVER);
    debug_assert!(matches!(&result, Some(ev) if advance_ev.matches(ev)));
    Ok(())
}

/// Current outstanding-event count.
pub fn sim_count() -> i32 {
    OUTSTANDING.load(Ordering::SeqCst)
}

/// Count one more outstanding unit of work. Every post to a counting
/// queue calls this; hosts tracking work outside queues may too.
pub fn sim_count_inc() {
    OUTSTANDING.fetch_add(1, Ordering::SeqCst);
}

/// Retire one outstanding unit of work.
pub fn sim_count_dec() {
    OUTSTANDING.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pausing and advancing are exercised end to end in
    // tests/sim_time.rs, in their own process: the overlay state and the
    // outstanding-event counter are process-wide and would leak into
    // every other unit test here.

    #[test]
    fn test_uninitialized_overlay_is_transparent() {
        assert!(!is_paused());
        assert_eq!(adjusted_now(1234), 1234);
    }
}
