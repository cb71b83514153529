//! Process-wide monotonic clock in native ticks
//!
//! Uses a process-wide start point so tick values start near zero and
//! never go backwards. With the `sim-time` feature the returned time is
//! routed through the simulated-clock overlay, which can freeze it and
//! step it forward explicitly.

use std::sync::OnceLock;
use std::time::Instant;

use evrun_core::time::{native_to_ms, TimeMs, TimeNative, TICK_HZ};

pub(crate) const NS_PER_TICK: u64 = 1_000_000_000 / TICK_HZ;

static START: OnceLock<Instant> = OnceLock::new();

/// Raw tick count, unaffected by the simulated clock.
pub(crate) fn raw_ticks() -> TimeNative {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64 / NS_PER_TICK
}

cfg_if::cfg_if! {
    if #[cfg(feature = "sim-time")] {
        /// Current time in native ticks, as seen through the simulated
        /// clock.
        #[inline]
        pub fn now_native() -> TimeNative {
            crate::sim::adjusted_now(raw_ticks())
        }
    } else {
        /// Current time in native ticks.
        #[inline]
        pub fn now_native() -> TimeNative {
            raw_ticks()
        }
    }
}

/// Current time in milliseconds.
#[inline]
pub fn now_ms() -> TimeMs {
    native_to_ms(now_native())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_monotonic() {
        let t1 = now_native();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let t2 = now_native();
        assert!(t2 > t1);
    }
}
