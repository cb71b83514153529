//! # evrun - event-driven runtime for device firmware
//!
//! A small, uniform task/queue/timer layer on top of a host OS:
//!
//! - **Event queues**: bounded FIFOs of events, non-blocking ISR-safe
//!   producers, blocking consumers with timeouts
//! - **Pooled events**: a fixed-size allocator drawing uniform event
//!   records from a freelist
//! - **Timer service**: one scheduler task that reposts timer events to
//!   their owners on expiry, with race-free restart and cancellation
//! - **Resendable timers**: send/receive accounting so aggressive
//!   cancel-and-restart never dispatches a stale timer
//! - **Tasks, locks, semaphores**: the minimal supporting layer the
//!   components above need
//!
//! ## Quick Start
//!
//! ```ignore
//! use evrun::{EventQueue, TimerConfig, TimerService};
//!
//! fn main() {
//!     let service = TimerService::start(TimerConfig::default()).unwrap();
//!     let queue = EventQueue::new(8).unwrap();
//!
//!     let timer = service.new_timer(None, &queue);
//!     timer.start(125, false).unwrap();
//!
//!     let event = queue.get_with_timeout(evrun::TIMEOUT_NEVER).unwrap();
//!     assert!(timer.matches(&event));
//!     if timer.is_valid() {
//!         // the timer really expired; act on it
//!     }
//! }
//! ```
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

// Re-export core types
pub use evrun_core::error::{Error, Result};
pub use evrun_core::time::{
    ms_to_delay_native, ms_to_native, native_to_ms, TimeMs, TimeNative, TICK_HZ,
    TIMEOUT_NEVER, TIMEOUT_NOW, TIME_NEVER_NATIVE,
};

// Re-export logging macros and their configuration
pub use evrun_core::log::{init as init_logging, set_level as set_log_level, Level, Region};
pub use evrun_core::{evlog_crit, evlog_debug, evlog_trace, evlog_warn};

// Re-export runtime types
pub use evrun_runtime::{
    clock, dispatch, event, lock, pool, queue, semaphore, task, timer, Event, EventHandler,
    EventPool, EventQueue, EventType, Lock, LockGuard, PooledEvent, PostError, RecursiveLock,
    RecursiveLockGuard, ResendableTimer, Semaphore, Task, TaskPriority, TimerConfig, TimerEvent,
    TimerFlags, TimerService, UserEvent, DEFAULT_MAX_TIMER_EVENTS, EVENT_IGNORED, EVENT_REBOOT,
    EVENT_RESTART, EVENT_SHIFT_FOCUS,
};

pub use evrun_runtime::{current_name, sleep_ms, yield_now};

#[cfg(feature = "sim-time")]
pub use evrun_runtime::sim;
