//! Timer events
//!
//! A timer event serves as both the timeout request and the response: the
//! client arms it by posting it to the timer service's queue, and the
//! scheduler posts it back to the client's return queue on expiry. The
//! structure is therefore shared between the client task and the timer
//! task, and all of its mutable bookkeeping sits behind a small per-timer
//! lock.
//!
//! Restart and cancel never reach into the scheduler directly. They flag
//! the shared state and let the scheduler observe the change on its next
//! pass, which is what makes them race-free: any delivery already in
//! flight identifies itself as invalid when the receiver checks it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bitflags::bitflags;

use evrun_core::error::{Error, Result};
use evrun_core::time::{ms_to_delay_native, TimeMs, TimeNative};

use crate::clock;
use crate::event::{Event, EventHandler};
use crate::queue::{EventQueue, WeakEventQueue};
use crate::timer::service::TimerShared;

bitflags! {
    /// Timer behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerFlags: u32 {
        /// Cancelled; any queued delivery is invalid. The event may still
        /// surface once if it was already being posted.
        const CANCELLED   = 0x0001;
        /// Re-arm on every expiry instead of retiring.
        const REPEAT      = 0x0002;
        /// Cancel, but echo the event back once the cancel is observed.
        /// Closed-loop cancellation for callers tracking resources.
        const CANCEL_ECHO = 0x0004;
        /// Deadline participates in the host's next-wake-time query.
        const WAKE        = 0x0008;
        /// On re-arm, echo the displaced delivery instead of silently
        /// dropping it.
        const DISPLACE    = 0x0010;

        const ANY_CANCEL  = Self::CANCELLED.bits() | Self::CANCEL_ECHO.bits();
    }
}

/// What the scheduler should do with a received timer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Ordinary timer: track it in the armed table.
    Normal,
    /// Echo straight back to the return queue; used to synchronize with
    /// the scheduler thread.
    #[cfg(feature = "sim-time")]
    Barrier,
    /// Drive the simulated-clock advance loop.
    #[cfg(feature = "sim-time")]
    Advance,
}

/// Mutable timer bookkeeping, guarded by the per-timer lock.
pub(crate) struct TimerState {
    pub(crate) flags: TimerFlags,
    /// Native time at arming (rebased on each repeat).
    pub(crate) time_now: TimeNative,
    /// Armed delay in native ticks (delay-converted, so one slack tick
    /// is included).
    pub(crate) timeout_native: TimeNative,
    /// Nominal delay as requested.
    pub(crate) timeout_ms: TimeMs,
    /// Deliveries posted to the return queue and not yet acknowledged.
    pub(crate) queued_count: u32,
    /// Deliveries that belong to a previous arming and must be reported
    /// invalid.
    pub(crate) ignore_count: u32,
}

struct TimerInner {
    kind: TimerKind,
    handler: Option<Arc<dyn EventHandler>>,
    /// Weak: the delivery path must not keep the client's queue alive.
    return_queue: WeakEventQueue,
    /// Weak: a stopped-and-dropped service turns `start` into `Err(Init)`.
    service: Weak<TimerShared>,
    state: Mutex<TimerState>,
}

/// Shared handle to a timer event.
///
/// Clones share the same timer; the copy delivered through the return
/// queue is the same timer the client armed ([`TimerEvent::matches`]).
#[derive(Clone)]
pub struct TimerEvent {
    inner: Arc<TimerInner>,
}

impl TimerEvent {
    pub(crate) fn new(
        service: Weak<TimerShared>,
        handler: Option<Arc<dyn EventHandler>>,
        return_queue: &EventQueue,
    ) -> TimerEvent {
        Self::with_kind(TimerKind::Normal, service, handler, return_queue)
    }

    #[cfg(feature = "sim-time")]
    pub(crate) fn new_barrier(service: Weak<TimerShared>, echo_queue: &EventQueue) -> TimerEvent {
        Self::with_kind(TimerKind::Barrier, service, None, echo_queue)
    }

    #[cfg(feature = "sim-time")]
    pub(crate) fn new_advance(service: Weak<TimerShared>, echo_queue: &EventQueue) -> TimerEvent {
        Self::with_kind(TimerKind::Advance, service, None, echo_queue)
    }

    fn with_kind(
        kind: TimerKind,
        service: Weak<TimerShared>,
        handler: Option<Arc<dyn EventHandler>>,
        return_queue: &EventQueue,
    ) -> TimerEvent {
        TimerEvent {
            inner: Arc::new(TimerInner {
                kind,
                handler,
                return_queue: return_queue.downgrade(),
                service,
                state: Mutex::new(TimerState {
                    flags: TimerFlags::empty(),
                    time_now: 0,
                    timeout_native: 0,
                    timeout_ms: 0,
                    queued_count: 0,
                    ignore_count: 0,
                }),
            }),
        }
    }

    /// Start or restart the timer.
    ///
    /// An already-running (or fired-but-unreceived) arming is retired
    /// atomically with respect to the receiving task: deliveries from it
    /// will fail their validity check. Fails with [`Error::Init`] before
    /// the timer service is started or once it is shutting down.
    pub fn start(&self, timeout_ms: TimeMs, repeating: bool) -> Result<()> {
        let service = self.inner.service.upgrade().ok_or(Error::Init)?;
        if !service.is_running() {
            return Err(Error::Init);
        }

        {
            let mut st = self.inner.state.lock().unwrap();
            // every delivery already in flight belongs to the retired arming
            st.ignore_count = st.queued_count;
            st.flags.remove(TimerFlags::ANY_CANCEL);
            st.flags.set(TimerFlags::REPEAT, repeating);
            st.timeout_ms = timeout_ms;
            st.time_now = clock::now_native();
            st.timeout_native = ms_to_delay_native(timeout_ms);
        }

        service.queue.post(Event::Timer(self.clone()))?;

        #[cfg(feature = "sim-time")]
        crate::timer::service::barrier(&service);

        Ok(())
    }

    /// Cancel the timer.
    ///
    /// Once this returns, no delivery of this timer will check out as
    /// valid; a delivery already posted may still surface and must be
    /// identified through [`TimerEvent::is_valid`] (or `dispatch`).
    pub fn cancel(&self) {
        self.inner
            .state
            .lock()
            .unwrap()
            .flags
            .insert(TimerFlags::CANCELLED);

        if let Some(service) = self.inner.service.upgrade() {
            // kick the scheduler so the cancel is observed promptly; a
            // full queue already has a sweep pending
            let _ = service.queue.post(Event::Runtime);

            #[cfg(feature = "sim-time")]
            crate::timer::service::barrier(&service);
        }
    }

    /// Check and consume one delivery of this timer.
    ///
    /// Must be called exactly once per dequeued timer event, from the
    /// receiving task. Returns true iff this delivery corresponds to a
    /// live, uncancelled arming.
    pub fn is_valid(&self) -> bool {
        let mut st = self.inner.state.lock().unwrap();
        debug_assert!(st.queued_count > 0, "no delivery outstanding");
        st.queued_count = st.queued_count.saturating_sub(1);

        if st.ignore_count > 0 {
            st.ignore_count -= 1;
            false
        } else {
            !st.flags.intersects(TimerFlags::ANY_CANCEL)
        }
    }

    /// Whether `event` is a delivery of this timer.
    pub fn matches(&self, event: &Event) -> bool {
        matches!(event, Event::Timer(t) if self.same_timer(t))
    }

    /// Nominal delay of the current arming.
    pub fn timeout_ms(&self) -> TimeMs {
        self.inner.state.lock().unwrap().timeout_ms
    }

    /// Snapshot of the timer's behaviour flags. May be stale as soon as
    /// it is taken.
    pub fn flags(&self) -> TimerFlags {
        self.inner.state.lock().unwrap().flags
    }

    pub fn handler(&self) -> Option<&Arc<dyn EventHandler>> {
        self.inner.handler.as_ref()
    }

    /// Mark the timer's deadline as a wake source for the host's
    /// power-management query.
    #[cfg(feature = "wake-timer")]
    pub fn set_wake(&self, wake: bool) {
        self.inner
            .state
            .lock()
            .unwrap()
            .flags
            .set(TimerFlags::WAKE, wake);
    }

    /// Echo displaced deliveries on re-arm instead of dropping them.
    pub fn set_displace(&self, displace: bool) {
        self.inner
            .state
            .lock()
            .unwrap()
            .flags
            .set(TimerFlags::DISPLACE, displace);
    }

    pub(crate) fn same_timer(&self, other: &TimerEvent) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    #[cfg(feature = "sim-time")]
    pub(crate) fn is_barrier(&self) -> bool {
        self.inner.kind == TimerKind::Barrier
    }

    #[cfg(feature = "sim-time")]
    pub(crate) fn is_advance(&self) -> bool {
        self.inner.kind == TimerKind::Advance
    }

    pub(crate) fn return_queue(&self) -> Option<EventQueue> {
        self.inner.return_queue.upgrade()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        self.inner.state.lock().unwrap()
    }

    /// Consume one delivery without interpreting the result. Used by the
    /// resendable layer, which applies its own validity rule but must
    /// keep the per-delivery ledger balanced.
    pub(crate) fn consume_delivery(&self) {
        let _ = self.is_valid();
    }

    /// Request closed-loop cancellation: the scheduler will echo the
    /// event back instead of dropping it.
    pub(crate) fn request_cancel_echo(&self) {
        self.inner
            .state
            .lock()
            .unwrap()
            .flags
            .insert(TimerFlags::CANCEL_ECHO);
    }

    pub(crate) fn is_cancel_pending(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap()
            .flags
            .intersects(TimerFlags::ANY_CANCEL)
    }
}

impl fmt::Debug for TimerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimerEvent({:p}, {:?})",
            Arc::as_ptr(&self.inner),
            self.inner.kind
        )
    }
}
