//! Time units and tick conversion
//!
//! The runtime keeps two time domains: portable milliseconds (`TimeMs`)
//! used at every public API boundary, and opaque native ticks
//! (`TimeNative`) used internally by the timer service and the blocking
//! primitives. Applications should not interpret native values; they only
//! round-trip through the conversions here.
//!
//! # Rounding
//!
//! Delay conversion rounds *up* and then adds one extra tick, because a
//! delay request can land anywhere inside the current tick period. The
//! result is a guarantee that a delay is never shorter than the requested
//! number of milliseconds. Conversion back to milliseconds rounds down.

/// Time interval in milliseconds.
pub type TimeMs = u32;

/// Time interval in native ticks. Opaque to applications.
pub type TimeNative = u64;

/// A timeout that never occurs.
pub const TIMEOUT_NEVER: TimeMs = TimeMs::MAX;

/// A timeout that expires immediately (poll).
pub const TIMEOUT_NOW: TimeMs = 0;

/// Native sentinel corresponding to [`TIMEOUT_NEVER`].
pub const TIME_NEVER_NATIVE: TimeNative = TimeNative::MAX;

/// Native tick rate. One tick per millisecond keeps the math cheap while
/// still exercising the rounding rules real tick rates need.
pub const TICK_HZ: u64 = 1000;

/// Convert milliseconds to native ticks, rounding down.
///
/// Nonzero inputs shorter than one tick return one tick.
pub fn ms_to_native(ms: TimeMs) -> TimeNative {
    if ms == TIMEOUT_NEVER {
        TIME_NEVER_NATIVE
    } else if ms == 0 {
        0
    } else {
        let t = (ms as u64 * TICK_HZ) / 1000;
        if t != 0 {
            t
        } else {
            1
        }
    }
}

/// Convert a millisecond delay to native ticks for use with blocking APIs.
///
/// Rounds up, then adds one tick of slack so the delay is never early
/// regardless of where in the current tick period the request lands.
/// Zero polls; [`TIMEOUT_NEVER`] maps to [`TIME_NEVER_NATIVE`].
pub fn ms_to_delay_native(ms: TimeMs) -> TimeNative {
    if ms == TIMEOUT_NEVER {
        TIME_NEVER_NATIVE
    } else if ms == 0 {
        0
    } else {
        (ms as u64 * TICK_HZ + 999) / 1000 + 1
    }
}

/// Convert native ticks back to milliseconds, rounding down.
///
/// Values too large for the millisecond domain saturate to
/// [`TIMEOUT_NEVER`].
pub fn native_to_ms(ticks: TimeNative) -> TimeMs {
    if ticks == TIME_NEVER_NATIVE {
        TIMEOUT_NEVER
    } else {
        let ms = ticks.saturating_mul(1000) / TICK_HZ;
        if ms >= TIMEOUT_NEVER as u64 {
            TIMEOUT_NEVER
        } else {
            ms as TimeMs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_round_trips() {
        assert_eq!(ms_to_native(TIMEOUT_NEVER), TIME_NEVER_NATIVE);
        assert_eq!(ms_to_delay_native(TIMEOUT_NEVER), TIME_NEVER_NATIVE);
        assert_eq!(native_to_ms(TIME_NEVER_NATIVE), TIMEOUT_NEVER);
    }

    #[test]
    fn test_zero_polls() {
        assert_eq!(ms_to_native(0), 0);
        assert_eq!(ms_to_delay_native(0), 0);
        assert_eq!(native_to_ms(0), 0);
    }

    #[test]
    fn test_delay_is_never_early() {
        // Converting a delay to ticks and back must never lose time.
        for ms in [1u32, 2, 10, 125, 999, 1000, 1001, 60_000, 3_600_000] {
            let ticks = ms_to_delay_native(ms);
            assert!(
                native_to_ms(ticks) >= ms,
                "delay of {} ms shortened to {} ms",
                ms,
                native_to_ms(ticks)
            );
        }
    }

    #[test]
    fn test_delay_adds_slack_tick() {
        // One extra tick beyond the ceiling, always.
        assert_eq!(ms_to_delay_native(1), (TICK_HZ + 999) / 1000 + 1);
        assert_eq!(ms_to_delay_native(1000), TICK_HZ + 1);
    }

    #[test]
    fn test_sub_tick_rounds_to_one() {
        // ms_to_native never returns zero for a nonzero request.
        assert!(ms_to_native(1) >= 1);
    }

    #[test]
    fn test_native_to_ms_rounds_down() {
        let ticks = ms_to_native(1500);
        assert_eq!(native_to_ms(ticks), 1500);
        // A fractional tick count truncates.
        assert_eq!(native_to_ms(1), (1000 / TICK_HZ) as u32);
    }
}
