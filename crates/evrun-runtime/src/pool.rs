//! Pooled events
//!
//! A fixed-size pool of uniform event records. Producers draw an event,
//! fill it in, post it somewhere; whoever finishes with it recycles it.
//! When to recycle is a policy decision owned by the application, not the
//! pool: the pool keeps no per-event generation counter, so a recycled
//! event must not be retained by the recycler.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use evrun_core::error::{Error, Result};
use evrun_core::log::Region;
use evrun_core::{evlog_crit, evlog_debug};

use crate::event::{EventHandler, EventType};
use crate::queue::EventQueue;

/// Event drawn from an [`EventPool`].
///
/// Extends the common event fields with a return queue for responses and
/// an opaque payload.
pub struct PooledEvent {
    handler: Option<Arc<dyn EventHandler>>,
    return_queue: Option<EventQueue>,
    payload: Option<Box<dyn Any + Send>>,
}

impl PooledEvent {
    fn blank() -> PooledEvent {
        PooledEvent {
            handler: None,
            return_queue: None,
            payload: None,
        }
    }

    /// Clear the event back to its blank state before it re-enters the
    /// freelist.
    fn reset(&mut self) {
        self.handler = None;
        self.return_queue = None;
        self.payload = None;
    }

    pub fn event_type(&self) -> EventType {
        EventType::POOLED
    }

    pub fn handler(&self) -> Option<&Arc<dyn EventHandler>> {
        self.handler.as_ref()
    }

    pub fn set_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handler = Some(handler);
    }

    pub fn return_queue(&self) -> Option<&EventQueue> {
        self.return_queue.as_ref()
    }

    pub fn set_return_queue(&mut self, queue: EventQueue) {
        self.return_queue = Some(queue);
    }

    pub fn payload(&self) -> Option<&(dyn Any + Send)> {
        self.payload.as_deref()
    }

    pub fn set_payload(&mut self, payload: Box<dyn Any + Send>) {
        self.payload = Some(payload);
    }

    pub fn take_payload(&mut self) -> Option<Box<dyn Any + Send>> {
        self.payload.take()
    }
}

impl fmt::Debug for PooledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledEvent")
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Fixed-size pool of [`PooledEvent`] records.
///
/// The freelist spine is a lock-free bounded queue, so `get_event` and
/// `recycle_event` are safe from any number of concurrent tasks.
/// Cloning the pool handle shares the same freelist.
#[derive(Clone, Debug)]
pub struct EventPool {
    free: Arc<ArrayQueue<PooledEvent>>,
}

impl EventPool {
    /// Create a pool of `capacity` events.
    ///
    /// Zero capacity fails with [`Error::BadInput`].
    pub fn new(capacity: usize) -> Result<EventPool> {
        if capacity == 0 {
            evlog_crit!(Region::Pool, "invalid event pool capacity 0");
            return Err(Error::BadInput);
        }

        let free = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            // Cannot fail: the queue was sized for exactly this many.
            let _ = free.push(PooledEvent::blank());
        }

        Ok(EventPool {
            free: Arc::new(free),
        })
    }

    /// Draw an event from the pool, or `None` when the pool is drained.
    pub fn get_event(&self) -> Option<PooledEvent> {
        let event = self.free.pop();
        if event.is_none() {
            evlog_debug!(Region::Pool, "no more events in event pool");
        }
        event
    }

    /// Return an event to the freelist.
    ///
    /// Recycling more events than were drawn is a caller bug; the extra
    /// recycle is dropped and logged.
    pub fn recycle_event(&self, mut event: PooledEvent) {
        event.reset();
        if self.free.push(event).is_err() {
            evlog_crit!(Region::Pool, "attempt to recycle event to full pool");
        }
    }

    /// Total number of events the pool was created with.
    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    /// Events currently on the freelist. May be stale immediately.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(EventPool::new(0).unwrap_err(), Error::BadInput);
    }

    #[test]
    fn test_drain_and_recycle() {
        let pool = EventPool::new(4).unwrap();
        assert_eq!(pool.capacity(), 4);

        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.get_event().unwrap());
        }
        assert!(pool.get_event().is_none());
        assert_eq!(pool.available(), 0);

        for ev in held {
            pool.recycle_event(ev);
        }
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_recycled_event_is_blank() {
        let pool = EventPool::new(1).unwrap();
        let queue = EventQueue::new(1).unwrap();

        let mut ev = pool.get_event().unwrap();
        ev.set_return_queue(queue);
        ev.set_payload(Box::new(55u64));
        pool.recycle_event(ev);

        let ev = pool.get_event().unwrap();
        assert!(ev.return_queue().is_none());
        assert!(ev.payload().is_none());
    }

    #[test]
    fn test_payload_round_trip() {
        let pool = EventPool::new(1).unwrap();
        let mut ev = pool.get_event().unwrap();
        ev.set_payload(Box::new("reading".to_string()));

        let payload = ev.take_payload().unwrap();
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "reading");
        pool.recycle_event(ev);
    }

    #[test]
    fn test_conservation_across_threads() {
        let pool = EventPool::new(8).unwrap();

        let mut workers = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..100 {
                    if let Some(ev) = pool.get_event() {
                        pool.recycle_event(ev);
                    }
                }
            }));
        }
        for w in workers {
            w.join().unwrap();
        }

        // After equal gets and recycles every event is available again.
        assert_eq!(pool.available(), 8);
    }
}
