//! Bounded event queues
//!
//! Queues are strict FIFOs of [`Event`] values with a capacity fixed at
//! creation. Posting never blocks: a full queue is an error surfaced to
//! the producer. Consumers block with a millisecond timeout (0 polls,
//! [`TIMEOUT_NEVER`] waits forever).
//!
//! `post_from_isr` is the producer path for interrupt context: it never
//! blocks, never allocates, and skips logging. On a hosted build it
//! shares the non-blocking push with `post`.
//!
//! With the `sim-time` feature every counting queue participates in the
//! global outstanding-event ledger: a post increments it and a get
//! decrements it lazily on the *next* get, so an event stays "outstanding"
//! while its consumer is processing it. Queues used purely for
//! synchronization should opt out with [`EventQueue::disable_counting`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use evrun_core::error::{Error, Result};
use evrun_core::evlog_crit;
use evrun_core::log::Region;
use evrun_core::time::{ms_to_delay_native, TimeMs, TimeNative, TIME_NEVER_NATIVE};

use crate::clock::NS_PER_TICK;
use crate::event::Event;

/// Error returned when posting to a full queue.
///
/// Carries the rejected event back to the producer, whose policy governs
/// its lifetime (a pooled event can be recycled, for example). Converts
/// into [`Error::NoResource`] where only the status matters.
pub struct PostError(pub Event);

impl PostError {
    pub fn into_event(self) -> Event {
        self.0
    }
}

impl fmt::Debug for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PostError").field(&self.0).finish()
    }
}

impl fmt::Display for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event queue full")
    }
}

impl std::error::Error for PostError {}

impl From<PostError> for Error {
    fn from(_: PostError) -> Error {
        Error::NoResource
    }
}

#[cfg(feature = "assert-on-full-queue")]
const DUMP_QUEUE_COUNT_LIMIT: usize = 64;

#[derive(Debug)]
struct QueueInner {
    buf: VecDeque<Event>,
    #[cfg(feature = "sim-time")]
    count_events: bool,
    #[cfg(feature = "sim-time")]
    prev_get_successful: bool,
}

#[derive(Debug)]
struct QueueShared {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    capacity: usize,
}

/// Bounded multi-producer/multi-consumer FIFO of events.
///
/// `EventQueue` is a cheap cloneable handle; clones share the same queue.
/// The queue is destroyed when the last handle drops.
#[derive(Clone, Debug)]
pub struct EventQueue {
    shared: Arc<QueueShared>,
}

/// Non-owning handle used where a back-reference must not keep the queue
/// alive (timer events point back at their return queue).
#[derive(Clone)]
pub(crate) struct WeakEventQueue {
    shared: Weak<QueueShared>,
}

impl WeakEventQueue {
    pub(crate) fn upgrade(&self) -> Option<EventQueue> {
        self.shared.upgrade().map(|shared| EventQueue { shared })
    }
}

fn native_to_duration(ticks: TimeNative) -> Duration {
    Duration::from_nanos(ticks.saturating_mul(NS_PER_TICK))
}

impl EventQueue {
    /// Create a queue holding up to `capacity` events.
    ///
    /// Zero capacity fails with [`Error::BadInput`].
    pub fn new(capacity: usize) -> Result<EventQueue> {
        if capacity == 0 {
            evlog_crit!(Region::Queue, "invalid queue capacity 0");
            return Err(Error::BadInput);
        }

        Ok(EventQueue {
            shared: Arc::new(QueueShared {
                inner: Mutex::new(QueueInner {
                    buf: VecDeque::with_capacity(capacity),
                    #[cfg(feature = "sim-time")]
                    count_events: true,
                    #[cfg(feature = "sim-time")]
                    prev_get_successful: false,
                }),
                not_empty: Condvar::new(),
                capacity,
            }),
        })
    }

    pub(crate) fn downgrade(&self) -> WeakEventQueue {
        WeakEventQueue {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Maximum number of events the queue can hold.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Post an event to the tail of the queue. Never blocks.
    ///
    /// A full queue rejects the event and hands it back in the error.
    pub fn post(&self, event: Event) -> core::result::Result<(), PostError> {
        self.post_inner(event, false)
    }

    /// Post an event from interrupt context. Never blocks, never
    /// allocates, never logs. The caller must assume it can be preempted
    /// by a higher-priority task as soon as this returns.
    pub fn post_from_isr(&self, event: Event) -> core::result::Result<(), PostError> {
        self.post_inner(event, true)
    }

    fn post_inner(&self, event: Event, from_isr: bool) -> core::result::Result<(), PostError> {
        let mut inner = self.shared.inner.lock().unwrap();

        if inner.buf.len() >= self.shared.capacity {
            if !from_isr {
                evlog_crit!(
                    Region::Queue,
                    "attempt to post event {:?} to full queue (capacity {}) from task {:?}",
                    event.event_type(),
                    self.shared.capacity,
                    std::thread::current().name()
                );
            }

            #[cfg(feature = "assert-on-full-queue")]
            dump_and_abort(&mut inner);

            #[cfg(not(feature = "assert-on-full-queue"))]
            return Err(PostError(event));
        }

        inner.buf.push_back(event);

        #[cfg(feature = "sim-time")]
        if inner.count_events {
            crate::sim::sim_count_inc();
        }

        drop(inner);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Receive an event, blocking up to `timeout_ms`.
    ///
    /// A timeout of 0 polls; [`TIMEOUT_NEVER`] blocks until an event
    /// arrives. Returns `None` when the timeout expires.
    pub fn get_with_timeout(&self, timeout_ms: TimeMs) -> Option<Event> {
        self.get_with_timeout_native(ms_to_delay_native(timeout_ms))
    }

    /// Native-tick variant used by the timer service, whose timeouts are
    /// already in the delay domain; converting through milliseconds again
    /// would stack a second rounding tick on every wait.
    pub(crate) fn get_with_timeout_native(&self, timeout: TimeNative) -> Option<Event> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().unwrap();

        #[cfg(feature = "sim-time")]
        if inner.count_events && inner.prev_get_successful {
            inner.prev_get_successful = false;
            crate::sim::sim_count_dec();
        }

        let event = if timeout == 0 {
            inner.buf.pop_front()
        } else if timeout == TIME_NEVER_NATIVE {
            loop {
                if let Some(ev) = inner.buf.pop_front() {
                    break Some(ev);
                }
                inner = shared.not_empty.wait(inner).unwrap();
            }
        } else {
            let deadline = Instant::now() + native_to_duration(timeout);
            loop {
                if let Some(ev) = inner.buf.pop_front() {
                    break Some(ev);
                }
                let now = Instant::now();
                if now >= deadline {
                    break None;
                }
                let (guard, _timed_out) = shared
                    .not_empty
                    .wait_timeout(inner, deadline - now)
                    .unwrap();
                inner = guard;
            }
        };

        #[cfg(feature = "sim-time")]
        if event.is_some() {
            inner.prev_get_successful = true;
        }

        event
    }

    /// Instantaneous snapshot of the number of queued events. May be
    /// stale by the time the caller looks at it.
    pub fn get_count(&self) -> u32 {
        self.shared.inner.lock().unwrap().buf.len() as u32
    }

    /// Opt this queue out of simulated-time event accounting.
    ///
    /// Use for queues that synchronize rather than carry work; without
    /// this, an event parked in such a queue would stall
    /// [`crate::sim`] time advancement forever. No effect without the
    /// `sim-time` feature.
    pub fn disable_counting(&self) {
        #[cfg(feature = "sim-time")]
        {
            self.shared.inner.lock().unwrap().count_events = false;
        }
    }
}

#[cfg(feature = "sim-time")]
impl Drop for QueueShared {
    fn drop(&mut self) {
        // The last successful get was never followed by another get, so
        // its lazy decrement is still owed.
        let inner = self.inner.get_mut().unwrap();
        if inner.count_events && inner.prev_get_successful {
            crate::sim::sim_count_dec();
        }
    }
}

/// Dump what the queue was full with, then abort. The drain is
/// destructive; survivors keep their order.
#[cfg(feature = "assert-on-full-queue")]
fn dump_and_abort(inner: &mut QueueInner) -> ! {
    let mut count = 0;
    while count < DUMP_QUEUE_COUNT_LIMIT {
        match inner.buf.pop_front() {
            Some(event) => {
                evlog_crit!(
                    Region::Queue,
                    "[{}] queued event type {:?}",
                    count,
                    event.event_type()
                );
                count += 1;
            }
            None => break,
        }
    }
    panic!("event queue full; dumped {} queued events", count);
}
