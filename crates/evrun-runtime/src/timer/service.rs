//! Timer service
//!
//! A single scheduler task owns the set of armed timers and the timer
//! queue. Clients never touch the armed table: arming, restarting and
//! cancelling all go through events (or flags observed at the next
//! sweep), so the table needs no lock of its own.
//!
//! Each pass the scheduler waits on the timer queue for the time left to
//! the earliest deadline, then walks the table: replaced armings are
//! retired (echoed when displacing), cancels are consumed, expired timers
//! are posted back to their owners and either retired or rebased for
//! repeat, and the next deadline is recomputed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use evrun_core::error::{Error, Result};
use evrun_core::log::Region;
use evrun_core::time::{native_to_ms, TimeNative, TIME_NEVER_NATIVE};
use evrun_core::{evlog_crit, evlog_debug, evlog_trace, evlog_warn};

use crate::clock;
use crate::event::{Event, EventHandler};
use crate::queue::EventQueue;
use crate::task::TaskPriority;
use crate::timer::event::{TimerEvent, TimerFlags, TimerState};

/// Default capacity of the armed-timer table.
pub const DEFAULT_MAX_TIMER_EVENTS: usize = 4;

/// Configuration for the timer service task.
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Maximum number of simultaneously armed timers.
    pub capacity: usize,

    /// Stack budget for the scheduler task (None = host default).
    pub stack_size: Option<usize>,

    /// Scheduler task name.
    pub thread_name: String,

    /// Scheduler task priority. Should outrank the client tasks so
    /// cancels and restarts are observed promptly.
    pub priority: TaskPriority,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAX_TIMER_EVENTS,
            stack_size: None,
            thread_name: "evrun-timer".into(),
            priority: TaskPriority::High,
        }
    }
}

/// State shared between the service handle, its timers and the scheduler
/// task.
pub(crate) struct TimerShared {
    pub(crate) queue: EventQueue,
    running: AtomicBool,
    /// Earliest armed deadline, absolute native; never-sentinel when the
    /// table is empty.
    next_deadline: AtomicU64,
    #[cfg(feature = "wake-timer")]
    min_wake: AtomicU64,
}

impl TimerShared {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Round-trip an event through the scheduler task. When this returns,
/// everything posted to the timer queue before the call has been
/// processed. Simulated time needs this so start/cancel are synchronous
/// with respect to the scheduler regardless of how the host schedules
/// threads.
#[cfg(feature = "sim-time")]
pub(crate) fn barrier(shared: &Arc<TimerShared>) {
    use evrun_core::time::TIMEOUT_NEVER;

    let Ok(echo_queue) = EventQueue::new(1) else {
        return;
    };
    let barrier = TimerEvent::new_barrier(Arc::downgrade(shared), &echo_queue);
    if shared.queue.post(Event::Timer(barrier.clone())).is_err() {
        evlog_warn!(Region::Timer, "timer queue full, barrier skipped");
        return;
    }
    let result = echo_queue.get_with_timeout(TIMEOUT_NEVER);
    debug_assert!(matches!(&result, Some(ev) if barrier.matches(ev)));
}

/// Handle to the running timer service.
///
/// Dropping the handle stops the scheduler task; timers started against a
/// stopped service fail with [`Error::Init`].
pub struct TimerService {
    pub(crate) shared: Arc<TimerShared>,
    thread: Option<JoinHandle<()>>,
}

impl TimerService {
    /// Launch the scheduler task.
    pub fn start(config: TimerConfig) -> Result<TimerService> {
        // one extra slot so an exit request fits with every timer armed
        let queue = EventQueue::new(config.capacity + 1)?;

        let shared = Arc::new(TimerShared {
            queue,
            running: AtomicBool::new(true),
            next_deadline: AtomicU64::new(TIME_NEVER_NATIVE),
            #[cfg(feature = "wake-timer")]
            min_wake: AtomicU64::new(TIME_NEVER_NATIVE),
        });

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let loop_shared = Arc::clone(&shared);
        let capacity = config.capacity;
        let priority = config.priority;
        let thread = builder
            .spawn(move || {
                crate::task::set_current_priority(priority);
                run_loop(loop_shared, capacity);
            })
            .map_err(|_| Error::NoResource)?;

        Ok(TimerService {
            shared,
            thread: Some(thread),
        })
    }

    /// The timer queue. Exposed so hosts can inspect it; timers post to
    /// it internally.
    pub fn queue(&self) -> &EventQueue {
        &self.shared.queue
    }

    /// Create a timer delivering to `return_queue` on expiry.
    pub fn new_timer(
        &self,
        handler: Option<Arc<dyn EventHandler>>,
        return_queue: &EventQueue,
    ) -> TimerEvent {
        TimerEvent::new(Arc::downgrade(&self.shared), handler, return_queue)
    }

    /// Earliest deadline the host must wake for, absolute native time;
    /// the never-sentinel when nothing is armed. With the `wake-timer`
    /// feature only WAKE-flagged timers participate, otherwise every
    /// armed timer does.
    pub fn wake_time(&self) -> TimeNative {
        #[cfg(feature = "wake-timer")]
        return self.shared.min_wake.load(Ordering::Acquire);

        #[cfg(not(feature = "wake-timer"))]
        return self.shared.next_deadline.load(Ordering::Acquire);
    }

    /// Advance simulated time by `ms`. See [`crate::sim`].
    #[cfg(feature = "sim-time")]
    pub fn advance_time_ms(&self, ms: evrun_core::time::TimeMs) -> Result<()> {
        crate::sim::advance(self, ms)
    }

    /// Stop the scheduler task and wait for it to exit. Armed timers are
    /// dropped; subsequent starts fail with [`Error::Init`].
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shared.running.store(false, Ordering::Release);
            // best-effort wakeup; the loop re-checks the running flag on
            // every pass, so a full queue only delays the exit
            let _ = self.shared.queue.post(Event::Exit);
            let _ = thread.join();
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(shared: Arc<TimerShared>, capacity: usize) {
    let mut timers: Vec<TimerEvent> = Vec::with_capacity(capacity);

    while shared.running.load(Ordering::Acquire) {
        let deadline = shared.next_deadline.load(Ordering::Relaxed);
        let timeout = if deadline == TIME_NEVER_NATIVE {
            TIME_NEVER_NATIVE
        } else {
            // an already-due deadline polls
            deadline.saturating_sub(clock::now_native())
        };

        match shared.queue.get_with_timeout_native(timeout) {
            Some(Event::Exit) => {
                shared.running.store(false, Ordering::Release);
                break;
            }
            Some(Event::Timer(timer)) => {
                #[cfg(feature = "sim-time")]
                if timer.is_advance() {
                    handle_advance(&shared, &mut timers, &timer, capacity);
                    continue;
                }
                sweep(&shared, &mut timers, Some(timer), capacity);
            }
            Some(other) => {
                if !matches!(other, Event::Runtime) {
                    evlog_debug!(
                        Region::Timer,
                        "received unexpected event of type {:?}",
                        other.event_type()
                    );
                }
                sweep(&shared, &mut timers, None, capacity);
            }
            None => sweep(&shared, &mut timers, None, capacity),
        }
    }

    drain_on_exit(&shared);
}

/// Drop whatever is still queued at shutdown. Barriers are echoed so no
/// task stays parked waiting on one.
fn drain_on_exit(shared: &Arc<TimerShared>) {
    while let Some(ev) = shared.queue.get_with_timeout_native(0) {
        #[cfg(feature = "sim-time")]
        if let Event::Timer(t) = &ev {
            if t.is_barrier() || t.is_advance() {
                if let Some(queue) = t.return_queue() {
                    let _ = queue.post(Event::Timer(t.clone()));
                }
            }
        }
        drop(ev);
    }
}

/// Post one delivery of `timer` to its return queue. The queued-delivery
/// count moves with the post, under the same state lock the receiver's
/// validity check takes.
fn post_delivery(timer: &TimerEvent, st: &mut TimerState) {
    match timer.return_queue() {
        Some(queue) => {
            if queue.post(Event::Timer(timer.clone())).is_ok() {
                st.queued_count += 1;
            } else {
                evlog_crit!(
                    Region::Timer,
                    "timer {:?} return queue full, delivery dropped",
                    timer
                );
            }
        }
        None => evlog_warn!(
            Region::Timer,
            "timer {:?} return queue gone, delivery dropped",
            timer
        ),
    }
}

/// One scheduler pass: process `incoming` (if any) against the armed
/// table, fire what is due, and recompute the next deadline.
fn sweep(
    shared: &TimerShared,
    timers: &mut Vec<TimerEvent>,
    incoming: Option<TimerEvent>,
    capacity: usize,
) {
    let now = clock::now_native();
    let mut next = TIME_NEVER_NATIVE;
    #[cfg(feature = "wake-timer")]
    let mut wake = TIME_NEVER_NATIVE;
    let mut incoming = incoming;

    let mut idx = 0;
    while idx < timers.len() {
        let timer = timers[idx].clone();
        let mut st = timer.lock_state();

        if incoming.as_ref().is_some_and(|inc| inc.same_timer(&timer)) {
            // The entry is the incoming event itself: the client already
            // restamped its times, so the arming is replaced in place.
            if st.flags.contains(TimerFlags::DISPLACE) {
                post_delivery(&timer, &mut st);
            }
            evlog_debug!(
                Region::Timer,
                "timer {:?} ({} ms) replaced",
                timer,
                st.timeout_ms
            );
            incoming = None;
        }

        if st.flags.contains(TimerFlags::CANCEL_ECHO) {
            evlog_debug!(
                Region::Timer,
                "timer {:?} ({} ms) cancelled with echo",
                timer,
                st.timeout_ms
            );
            post_delivery(&timer, &mut st);
            drop(st);
            timers.remove(idx);
            continue;
        } else if st.flags.contains(TimerFlags::CANCELLED) {
            evlog_debug!(
                Region::Timer,
                "timer {:?} ({} ms) cancelled",
                timer,
                st.timeout_ms
            );
            drop(st);
            timers.remove(idx);
            continue;
        }

        if now.saturating_sub(st.time_now) >= st.timeout_native {
            evlog_debug!(
                Region::Timer,
                "timer {:?} ({} ms) timed out",
                timer,
                st.timeout_ms
            );
            post_delivery(&timer, &mut st);

            if st.flags.contains(TimerFlags::REPEAT) {
                // The arming delay carried an extra rounding tick; take it
                // back out so repeats do not drift by a tick per period.
                st.time_now = now.saturating_sub(1);
            } else {
                drop(st);
                timers.remove(idx);
                continue;
            }
        }

        let deadline = st.time_now.saturating_add(st.timeout_native);
        if deadline < next {
            next = deadline;
        }
        #[cfg(feature = "wake-timer")]
        if st.flags.contains(TimerFlags::WAKE) && deadline < wake {
            wake = deadline;
        }

        drop(st);
        idx += 1;
    }

    #[cfg(feature = "sim-time")]
    if incoming.as_ref().is_some_and(|inc| inc.is_barrier()) {
        let barrier = incoming.take().unwrap();
        match barrier.return_queue() {
            Some(echo_queue) => {
                if echo_queue.post(Event::Timer(barrier.clone())).is_err() {
                    evlog_crit!(Region::Timer, "barrier echo queue full");
                }
            }
            None => evlog_warn!(Region::Timer, "barrier echo queue gone"),
        }
    }

    if let Some(timer) = incoming {
        if timers.len() == capacity {
            evlog_crit!(
                Region::Timer,
                "no space to add timer {:?}; max of {} timers exceeded",
                timer,
                capacity
            );
            panic!("timer table overflow ({} timers)", capacity);
        }

        let st = timer.lock_state();
        evlog_debug!(
            Region::Timer,
            "timer {:?} ({} ms) added",
            timer,
            st.timeout_ms
        );
        let deadline = st.time_now.saturating_add(st.timeout_native);
        if deadline < next {
            next = deadline;
        }
        #[cfg(feature = "wake-timer")]
        if st.flags.contains(TimerFlags::WAKE) && deadline < wake {
            wake = deadline;
        }
        drop(st);
        timers.push(timer);
    }

    shared.next_deadline.store(next, Ordering::Relaxed);
    #[cfg(feature = "wake-timer")]
    shared.min_wake.store(wake, Ordering::Relaxed);

    evlog_trace!(
        Region::Timer,
        "new timeout: {} ms",
        native_to_ms(next.saturating_sub(now))
    );
}

/// Drain every expired timer and every in-flight event in the system.
/// Precondition: simulated time is paused; afterwards all event-driven
/// tasks are blocked waiting, which is what lets virtual time move.
#[cfg(feature = "sim-time")]
fn handle_expired(shared: &Arc<TimerShared>, timers: &mut Vec<TimerEvent>, capacity: usize) {
    loop {
        let ev = shared.queue.get_with_timeout_native(0);
        let got = ev.is_some();
        match ev {
            Some(Event::Exit) => {
                shared.running.store(false, Ordering::Release);
            }
            Some(Event::Timer(timer)) => {
                // a racing advance request from another task must run its
                // own advance loop, not land in the armed table
                if timer.is_advance() {
                    handle_advance(shared, timers, &timer, capacity);
                } else {
                    sweep(shared, timers, Some(timer), capacity);
                }
            }
            Some(_) | None => sweep(shared, timers, None, capacity),
        }
        if !got && crate::sim::sim_count() <= 0 {
            break;
        }
    }
}

/// Advance the paused clock to the requested target, stepping from
/// deadline to deadline and draining the system at every stop, then echo
/// the advance event back to the caller.
#[cfg(feature = "sim-time")]
fn handle_advance(
    shared: &Arc<TimerShared>,
    timers: &mut Vec<TimerEvent>,
    advance: &TimerEvent,
    capacity: usize,
) {
    handle_expired(shared, timers, capacity);

    let target = crate::sim::advance_target();
    while clock::now_native() < target {
        let now = clock::now_native();
        let next = shared.next_deadline.load(Ordering::Relaxed);

        let step = if next != TIME_NEVER_NATIVE && next <= target {
            next.saturating_sub(now)
        } else {
            target - now
        };
        crate::sim::step_paused_time(step);

        handle_expired(shared, timers, capacity);
    }

    match advance.return_queue() {
        Some(queue) => {
            if queue.post(Event::Timer(advance.clone())).is_err() {
                evlog_crit!(Region::Timer, "advance echo queue full");
            }
        }
        None => evlog_warn!(Region::Timer, "advance echo queue gone"),
    }
}
