//! Leveled, region-tagged logging for the runtime
//!
//! Thread-safe diagnostics on stderr, cheap enough to leave compiled in.
//! Each statement names the subsystem (region) it comes from so firmware
//! logs can be filtered per component.
//!
//! # Environment Variables
//!
//! - `EVRUN_LOG_LEVEL=<level>` - 0=off, 1=crit, 2=warn, 3=debug, 4=trace
//! - `EVRUN_LOG_FLUSH=1` - flush stderr after each statement
//! - `EVRUN_LOG_TIME=1` - prefix statements with a nanosecond timestamp
//!
//! # Usage
//!
//! ```ignore
//! use evrun_core::{evlog_crit, evlog_debug, log::Region};
//!
//! evlog_crit!(Region::Queue, "attempt to post to full queue {:p}", &q);
//! evlog_debug!(Region::Timer, "timer {} added", id);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Log levels, most severe first
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Off = 0,
    Crit = 1,
    Warn = 2,
    Debug = 3,
    Trace = 4,
}

impl Level {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Level::Off,
            1 => Level::Crit,
            2 => Level::Warn,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Level::Off => "",
            Level::Crit => "[CRIT] ",
            Level::Warn => "[WARN] ",
            Level::Debug => "[DEBUG]",
            Level::Trace => "[TRACE]",
        }
    }
}

/// Subsystem a log statement originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Runtime,
    Queue,
    Pool,
    Timer,
    Task,
    Sim,
}

impl Region {
    pub fn tag(&self) -> &'static str {
        match self {
            Region::Runtime => "runtime",
            Region::Queue => "queue",
            Region::Pool => "pool",
            Region::Timer => "timer",
            Region::Task => "task",
            Region::Sim => "sim",
        }
    }
}

// Global configuration (initialized once, from the environment)
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Crit as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

// Start time for relative timestamps
static START_TIME: OnceLock<Instant> = OnceLock::new();

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}

/// Initialize logging from environment variables.
///
/// Called automatically on first use; call explicitly for deterministic
/// startup ordering.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    START_TIME.get_or_init(Instant::now);

    FLUSH_ENABLED.store(env_flag("EVRUN_LOG_FLUSH"), Ordering::Relaxed);
    TIME_ENABLED.store(env_flag("EVRUN_LOG_TIME"), Ordering::Relaxed);

    if let Ok(val) = std::env::var("EVRUN_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => Level::Off,
            "crit" | "1" => Level::Crit,
            "warn" | "2" => Level::Warn,
            "debug" | "3" => Level::Debug,
            "trace" | "4" => Level::Trace,
            _ => Level::Crit,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Current log level
#[inline]
pub fn level() -> Level {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set the log level programmatically
pub fn set_level(level: Level) {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check if a level is enabled
#[inline]
pub fn level_enabled(level: Level) -> bool {
    level as u8 <= self::level() as u8
}

/// Elapsed nanoseconds since logging started
#[inline]
pub fn elapsed_ns() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// Internal: leveled write with region tag
#[doc(hidden)]
pub fn _evlog_impl(level: Level, region: Region, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }

    let stderr = std::io::stderr();
    let mut handle = stderr.lock();

    let _ = write!(handle, "{} ", level.prefix());

    if TIME_ENABLED.load(Ordering::Relaxed) {
        let _ = write!(handle, "[{}] ", elapsed_ns());
    }

    let _ = write!(handle, "[{}] ", region.tag());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");

    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = handle.flush();
    }
}

/// Critical diagnostics (resource exhaustion, invariant violations)
#[macro_export]
macro_rules! evlog_crit {
    ($region:expr, $($arg:tt)*) => {{
        $crate::log::_evlog_impl(
            $crate::log::Level::Crit,
            $region,
            format_args!($($arg)*)
        );
    }};
}

/// Warnings (unexpected but recoverable conditions)
#[macro_export]
macro_rules! evlog_warn {
    ($region:expr, $($arg:tt)*) => {{
        $crate::log::_evlog_impl(
            $crate::log::Level::Warn,
            $region,
            format_args!($($arg)*)
        );
    }};
}

/// Debug tracing of state transitions
#[macro_export]
macro_rules! evlog_debug {
    ($region:expr, $($arg:tt)*) => {{
        $crate::log::_evlog_impl(
            $crate::log::Level::Debug,
            $region,
            format_args!($($arg)*)
        );
    }};
}

/// High-volume tracing
#[macro_export]
macro_rules! evlog_trace {
    ($region:expr, $($arg:tt)*) => {{
        $crate::log::_evlog_impl(
            $crate::log::Level::Trace,
            $region,
            format_args!($($arg)*)
        );
    }};
}
