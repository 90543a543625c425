//! SIEVE - Custom Error Types
//! Defines the error hierarchy shared by every filter backend.

use std::path::PathBuf;

use thiserror::Error;

/// Custom Result type for Sieve.
pub type Result<T> = std::result::Result<T, SieveError>;

/// Error types for Sieve filters.
#[derive(Error, Debug)]
pub enum SieveError {
    /// Invalid parameters or connection settings. Only raised at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from persist/restore or the store directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No persisted image exists at the derived path.
    #[error("Filter image not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Image bytes failed validation (magic, version, checksum).
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote timeout, reset or refused connection.
    /// The membership effect of the failed call is indeterminate.
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// The remote store rejected the request (e.g. WRONGTYPE).
    /// Retrying the same call fails the same way.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Unrecoverable failure (bit vector allocation).
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl SieveError {
    /// Returns true when retrying the same call may succeed.
    /// Retried adds are safe: adding a present item changes nothing.
    pub fn is_transient(&self) -> bool {
        matches!(self, SieveError::Transient(_))
    }
}

impl From<bincode::Error> for SieveError {
    fn from(err: bincode::Error) -> Self {
        SieveError::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for SieveError {
    fn from(err: redis::RedisError) -> Self {
        use redis::ErrorKind;

        if err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_io_error()
            || matches!(err.kind(), ErrorKind::BusyLoadingError | ErrorKind::TryAgain)
        {
            return SieveError::Transient(format!("redis: {}", err));
        }
        match err.kind() {
            ErrorKind::AuthenticationFailed | ErrorKind::InvalidClientConfig => {
                SieveError::Config(format!("redis: {}", err))
            }
            _ => SieveError::Backend(format!("redis: {}", err)),
        }
    }
}
