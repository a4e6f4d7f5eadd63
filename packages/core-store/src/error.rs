//! Error types shared by every saved-state layer.

use thiserror::Error;

use crate::Key;

/// Errors raised while converting, storing, or loading saved state.
///
/// An absent key is not an error: reads return `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum Error {
    /// A stored value had a different shape than the reader expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A stored integer does not fit the requested type.
    #[error("value {value} out of range for {target}")]
    OutOfRange { value: i64, target: &'static str },

    /// An adapter rejected a value.
    #[error("adapter error: {message}")]
    Adapter { message: String },

    /// A domain value could not be encoded into a storable value.
    #[error("encode error: {message}")]
    Encode { message: String },

    /// A storable value could not be decoded into a domain value.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// The underlying container failed.
    #[error("container error during {operation}: {message}")]
    Container {
        operation: &'static str,
        message: String,
    },

    /// An asynchronous default loader failed.
    #[error("default loader for {key} failed: {message}")]
    Loader { key: Key, message: String },

    /// The background executor could not be created or used.
    #[error("executor error: {message}")]
    Executor { message: String },

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an adapter error.
    pub fn adapter(message: impl Into<String>) -> Self {
        Error::Adapter {
            message: message.into(),
        }
    }

    /// Create an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Error::Encode {
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }

    /// Create a container error.
    pub fn container(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Container {
            operation,
            message: message.into(),
        }
    }

    /// Whether this error came from converting between domain and stored values.
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            Error::TypeMismatch { .. }
                | Error::OutOfRange { .. }
                | Error::Adapter { .. }
                | Error::Encode { .. }
                | Error::Decode { .. }
        )
    }
}

/// Result type alias for saved-state operations.
pub type Result<T> = std::result::Result<T, Error>;
