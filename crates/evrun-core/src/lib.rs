//! # evrun-core
//!
//! Core types for the evrun event runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Everything that touches threads or the clock lives in `evrun-runtime`.
//!
//! ## Modules
//!
//! - `error` - Error enum and `Result` alias
//! - `time` - Millisecond/native-tick domains and conversions
//! - `log` - Leveled, region-tagged logging macros

pub mod error;
pub mod log;
pub mod time;

// Re-exports for convenience
pub use error::{Error, Result};
pub use time::{
    ms_to_delay_native, ms_to_native, native_to_ms, TimeMs, TimeNative, TICK_HZ,
    TIMEOUT_NEVER, TIMEOUT_NOW, TIME_NEVER_NATIVE,
};
