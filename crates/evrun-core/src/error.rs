//! Error types for the evrun runtime

use core::fmt;

/// Result type for runtime operations
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur in runtime operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Non-specific failure
    Failure,

    /// Caller supplied a null, zero-size, or out-of-range argument
    BadInput,

    /// A bounded resource is exhausted (full queue, drained pool)
    NoResource,

    /// Operation attempted in a state that cannot accept it
    BadState,

    /// Storage could not be obtained
    NoMemory,

    /// Subsystem has not been initialized (or is shutting down)
    Init,

    /// Operation is not implemented on this platform
    NotImplemented,
}

impl Error {
    /// Stable numeric code for each error, preserved from the firmware
    /// error table so logs can be correlated across ports.
    pub fn code(&self) -> i32 {
        match self {
            Error::Failure => -1,
            Error::BadInput => -1000,
            Error::NoResource => -1001,
            Error::BadState => -1002,
            Error::NoMemory => -1003,
            Error::Init => -1004,
            Error::NotImplemented => -1005,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Failure => write!(f, "operation failed"),
            Error::BadInput => write!(f, "bad input"),
            Error::NoResource => write!(f, "no resource"),
            Error::BadState => write!(f, "bad state"),
            Error::NoMemory => write!(f, "no memory"),
            Error::Init => write!(f, "not initialized"),
            Error::NotImplemented => write!(f, "not implemented"),
        }
    }
}

impl std::error::Error for Error {}
