//! Events and dispatch
//!
//! Every event carries a type tag and an optional handler. Events are an
//! owned tagged sum: queues move `Event` values, and the variants that
//! need shared bookkeeping (timers) carry a cheaply cloneable handle.
//!
//! Type tags are carved into ranges: a few built-in types, a private user
//! band for quick module-local events, and an application band for
//! system-wide event numbering.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::pool::PooledEvent;
use crate::timer::TimerEvent;

/// Event type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(u16);

impl EventType {
    /// Runtime housekeeping event (never dispatched to applications)
    pub const RUNTIME: EventType = EventType(0);
    /// Timer expiry / echo
    pub const TIMER: EventType = EventType(1);
    /// Ask an event loop to shut down
    pub const EXIT: EventType = EventType(2);
    /// Event drawn from an [`crate::pool::EventPool`]
    pub const POOLED: EventType = EventType(3);

    /// First tag of the private user band.
    pub const USER_FIRST: u16 = 4;
    /// Last tag of the private user band.
    pub const USER_LAST: u16 = 999;
    /// First tag of the application band.
    pub const APP_FIRST: u16 = 1000;

    /// Tag in the private user band. Callers own conflict avoidance
    /// within this band.
    pub const fn user(offset: u16) -> EventType {
        assert!(Self::USER_FIRST + offset <= Self::USER_LAST);
        EventType(Self::USER_FIRST + offset)
    }

    /// Tag in the application band.
    pub const fn app(offset: u16) -> EventType {
        EventType(Self::APP_FIRST + offset)
    }

    pub const fn raw(&self) -> u16 {
        self.0
    }

    pub const fn is_user(&self) -> bool {
        self.0 >= Self::USER_FIRST && self.0 <= Self::USER_LAST
    }

    pub const fn is_app(&self) -> bool {
        self.0 >= Self::APP_FIRST
    }
}

/// Handler bound to an event.
///
/// The handler closure of the firmware API becomes captured state of the
/// trait object; implement this on your state type, or use any
/// `Fn(&Event) -> i32` closure directly.
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event) -> i32;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> i32 + Send + Sync,
{
    fn handle_event(&self, event: &Event) -> i32 {
        self(event)
    }
}

/// Application-defined event.
#[derive(Clone)]
pub struct UserEvent {
    event_type: EventType,
    handler: Option<Arc<dyn EventHandler>>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl UserEvent {
    pub fn new(event_type: EventType) -> UserEvent {
        UserEvent {
            event_type,
            handler: None,
            payload: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> UserEvent {
        self.handler = Some(handler);
        self
    }

    pub fn with_payload(mut self, payload: Arc<dyn Any + Send + Sync>) -> UserEvent {
        self.payload = Some(payload);
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn handler(&self) -> Option<&Arc<dyn EventHandler>> {
        self.handler.as_ref()
    }

    pub fn payload(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.payload.as_ref()
    }
}

impl fmt::Debug for UserEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEvent")
            .field("event_type", &self.event_type)
            .finish()
    }
}

/// An event, as carried by queues.
pub enum Event {
    /// Deferred delivery; bookkeeping is shared with the timer service.
    Timer(TimerEvent),
    /// Drawn from an [`crate::pool::EventPool`], recycled after use.
    Pooled(PooledEvent),
    /// Application-defined event.
    User(UserEvent),
    /// Housekeeping kick for service loops.
    Runtime,
    /// Ask the receiving event loop to shut down.
    Exit,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Timer(_) => EventType::TIMER,
            Event::Pooled(_) => EventType::POOLED,
            Event::User(u) => u.event_type(),
            Event::Runtime => EventType::RUNTIME,
            Event::Exit => EventType::EXIT,
        }
    }

    pub fn handler(&self) -> Option<&Arc<dyn EventHandler>> {
        match self {
            Event::Timer(t) => t.handler(),
            Event::Pooled(p) => p.handler(),
            Event::User(u) => u.handler(),
            Event::Runtime | Event::Exit => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Timer(t) => f.debug_tuple("Timer").field(t).finish(),
            Event::Pooled(p) => f.debug_tuple("Pooled").field(p).finish(),
            Event::User(u) => f.debug_tuple("User").field(u).finish(),
            Event::Runtime => write!(f, "Runtime"),
            Event::Exit => write!(f, "Exit"),
        }
    }
}

/// Event was looked at and deliberately not acted upon
pub const EVENT_IGNORED: i32 = 1;
/// Handler requests a focus shift in a higher layer
pub const EVENT_SHIFT_FOCUS: i32 = 2;
/// Handler requests a reboot
pub const EVENT_REBOOT: i32 = 3;
/// Handler requests a restart
pub const EVENT_RESTART: i32 = 4;

/// Dispatch an event to its handler, or to `default_handler` if it
/// carries none.
///
/// Timer events that fail their validity check (cancelled or displaced by
/// a restart) are swallowed and return 0; the validity check consumes one
/// delivery acknowledgement, so call this (or `TimerEvent::is_valid`)
/// exactly once per dequeued timer event, never both.
pub fn dispatch(event: &Event, default_handler: &dyn EventHandler) -> i32 {
    if let Event::Timer(timer) = event {
        if !timer.is_valid() {
            return 0;
        }
    }

    match event.handler() {
        Some(handler) => handler.handle_event(event),
        None => default_handler.handle_event(event),
    }
}
