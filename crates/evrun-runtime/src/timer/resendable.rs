//! Resendable timers
//!
//! Timers that can be cleanly cancelled or re-sent (refreshed) without
//! race conditions. The rule is simple: a client receives a timer every
//! time it sends one. Re-arming invalidates the previous expiration, and
//! the displaced delivery is echoed back rather than dropped; counting
//! sends against receives tells the client which deliveries to ignore.
//!
//! Call [`ResendableTimer::receive`] once, and only once, on every
//! delivery of the timer. If it returns true, handle the timer as normal;
//! otherwise ignore it. Do not also route the event through
//! [`crate::event::dispatch`]'s timer check: `receive` owns the
//! per-delivery acknowledgement.
//!
//! ```ignore
//! if rtimer.matches(&event) {
//!     if rtimer.receive() {
//!         // timer expired for real, act on it
//!     }
//!     // else: stale or cancelled delivery
//! }
//! ```

use std::sync::Mutex;

use evrun_core::error::Result;
use evrun_core::time::TimeMs;

use crate::event::Event;
use crate::timer::{TimerEvent, TimerFlags};

/// Timer with armed-vs-received accounting.
///
/// Every successful [`start`](ResendableTimer::start) is eventually
/// matched by exactly one delivery to [`receive`](ResendableTimer::receive),
/// regardless of re-sends and cancels.
pub struct ResendableTimer {
    timer: TimerEvent,
    /// Armings not yet matched by a receive.
    active: Mutex<u32>,
}

impl ResendableTimer {
    pub fn new(timer: TimerEvent) -> ResendableTimer {
        ResendableTimer {
            timer,
            active: Mutex::new(0),
        }
    }

    /// The wrapped timer event.
    pub fn timer(&self) -> &TimerEvent {
        &self.timer
    }

    /// Arm or re-arm the timer. A re-arm invalidates the previous
    /// expiration; its delivery still arrives and is counted.
    pub fn start(&self, timeout_ms: TimeMs) -> Result<()> {
        let mut active = self.active.lock().unwrap();

        // Repeating is not allowed here: the send/receive ledger needs
        // exactly one delivery per arming, so the client re-arms
        // explicitly after each expiration or cancel.
        self.timer.set_displace(true);

        *active += 1;
        match self.timer.start(timeout_ms, false) {
            Ok(()) => Ok(()),
            Err(e) => {
                *active -= 1;
                Err(e)
            }
        }
    }

    /// Cancel the timer. If an arming is outstanding its delivery is
    /// echoed back (and will be reported stale by `receive`) once the
    /// scheduler observes the cancel.
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap();
        if *active > 0 {
            self.timer.request_cancel_echo();
        }
        drop(active);
    }

    /// Account for one received delivery of this timer.
    ///
    /// Must be called exactly once per delivery. Returns true iff the
    /// delivery is a real expiration: the one outstanding arming, with no
    /// cancel pending.
    pub fn receive(&self) -> bool {
        let mut active = self.active.lock().unwrap();

        // a repeating arming (possible only by re-arming the wrapped
        // timer directly) delivers more than once per send and breaks
        // the ledger
        debug_assert!(!self.timer.flags().contains(TimerFlags::REPEAT));

        // keep the underlying per-delivery ledger balanced
        self.timer.consume_delivery();

        let valid = *active == 1 && !self.timer.is_cancel_pending();
        if *active > 0 {
            *active -= 1;
        }
        valid
    }

    /// Non-consuming inspection for observers that are not the intended
    /// receiver. The answer is only valid until the owner receives,
    /// re-sends or cancels the timer; prefer `receive` when you are the
    /// receiver.
    pub fn is_valid(&self) -> bool {
        let active = self.active.lock().unwrap();
        *active == 1 && !self.timer.is_cancel_pending()
    }

    /// Whether `event` is a delivery of this timer.
    pub fn matches(&self, event: &Event) -> bool {
        self.timer.matches(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EventQueue;
    use crate::timer::TimerEvent;
    use std::sync::Weak;

    fn orphan_resendable() -> (ResendableTimer, EventQueue) {
        let queue = EventQueue::new(4).unwrap();
        let timer = TimerEvent::new(Weak::new(), None, &queue);
        (ResendableTimer::new(timer), queue)
    }

    #[test]
    fn test_failed_start_undoes_increment() {
        let (rtimer, _queue) = orphan_resendable();
        // no service behind the timer, so the start fails
        assert!(rtimer.start(100).is_err());
        assert!(!rtimer.is_valid());
        assert_eq!(*rtimer.active.lock().unwrap(), 0);
    }

    #[test]
    fn test_cancel_without_arming_is_a_no_op() {
        let (rtimer, _queue) = orphan_resendable();
        rtimer.cancel();
        assert!(!rtimer.timer().is_cancel_pending());
    }

    #[test]
    fn test_single_arming_is_valid() {
        let (rtimer, _queue) = orphan_resendable();
        {
            let mut active = rtimer.active.lock().unwrap();
            *active = 1;
        }
        rtimer.timer().lock_state().queued_count = 1;

        assert!(rtimer.is_valid());
        assert!(rtimer.receive());
        assert!(!rtimer.is_valid());
    }

    #[test]
    fn test_double_arming_ignores_first_delivery() {
        let (rtimer, _queue) = orphan_resendable();
        {
            let mut active = rtimer.active.lock().unwrap();
            *active = 2;
        }
        rtimer.timer().lock_state().queued_count = 2;

        // first delivery: a displaced arming
        assert!(!rtimer.receive());
        // second delivery: the live one
        assert!(rtimer.receive());
    }

    #[test]
    fn test_cancel_pending_invalidates() {
        let (rtimer, _queue) = orphan_resendable();
        {
            let mut active = rtimer.active.lock().unwrap();
            *active = 1;
        }
        rtimer.timer().lock_state().queued_count = 1;
        rtimer.cancel();

        assert!(!rtimer.is_valid());
        assert!(!rtimer.receive());
    }
}
