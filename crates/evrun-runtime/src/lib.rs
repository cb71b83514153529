//! # evrun-runtime
//!
//! Event queues, pooled events and the timer service for the evrun
//! runtime, hosted on OS threads.
//!
//! ## Architecture
//!
//! ```text
//!  producer task / ISR ──► EventQueue ──► consumer task ──► dispatch ──► handler
//!                             ▲                                            │
//!                             │                                            │
//!                             └────────── timer task ◄──── timer queue ◄───┘
//!                                             ▲
//!                                             │
//!                                  client arms/cancels timer
//! ```
//!
//! ## Modules
//!
//! - `event` - Event sum type, handlers, dispatch
//! - `queue` - Bounded FIFO event queues, ISR-safe producer path
//! - `pool` - Fixed-size pooled-event allocator
//! - `timer` - Timer service, timer events, resendable overlay
//! - `task` - Named, priority-ranked tasks on host threads
//! - `lock` - Binary and recursive locks with timed acquire
//! - `semaphore` - Binary and counting semaphores with timed take
//! - `clock` - Process-wide monotonic clock in native ticks
//! - `sim` - Paused-clock overlay for deterministic tests (`sim-time`)

pub mod clock;
pub mod event;
pub mod lock;
pub mod pool;
pub mod queue;
pub mod semaphore;
pub mod task;
pub mod timer;

#[cfg(feature = "sim-time")]
pub mod sim;

// Re-exports for convenience
pub use event::{
    dispatch, Event, EventHandler, EventType, UserEvent, EVENT_IGNORED, EVENT_REBOOT,
    EVENT_RESTART, EVENT_SHIFT_FOCUS,
};
pub use lock::{Lock, LockGuard, RecursiveLock, RecursiveLockGuard};
pub use pool::{EventPool, PooledEvent};
pub use queue::{EventQueue, PostError};
pub use semaphore::Semaphore;
pub use task::{current_name, sleep_ms, yield_now, Task, TaskPriority};
pub use timer::{
    ResendableTimer, TimerConfig, TimerEvent, TimerFlags, TimerService, DEFAULT_MAX_TIMER_EVENTS,
};

// The core time and error vocabulary is part of this crate's API surface.
pub use evrun_core::error::{Error, Result};
pub use evrun_core::time::{TimeMs, TimeNative, TIMEOUT_NEVER, TIMEOUT_NOW, TIME_NEVER_NATIVE};
