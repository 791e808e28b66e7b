//! Lock error types

use std::time::Duration;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors surfaced by acquire, release and the store collaborators.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The store is unreachable, dropped the connection or rejected credentials
    #[error("connection failure: {0}")]
    Connection(String),

    /// No conditional create succeeded before the acquire deadline
    #[error("acquire lock {key} timed out after {}ms", timeout.as_millis())]
    AcquireTimeout { key: String, timeout: Duration },

    /// The watched key changed while the release transaction was pending
    #[error("lock {0} changed during release")]
    ReleaseConflict(String),

    /// Unexpected reply from the store
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// True when the lock was simply busy for the whole acquire window.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::AcquireTimeout { .. })
    }

    /// True for release races whose outcome could not be verified.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LockError::ReleaseConflict(_))
    }

    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            LockError::Connection(_) => "connection_error",
            LockError::AcquireTimeout { .. } => "timeout",
            LockError::ReleaseConflict(_) => "conflict",
            LockError::Protocol(_) => "protocol_error",
            LockError::Config(_) => "config_error",
        }
    }
}

impl From<config::ConfigError> for LockError {
    fn from(err: config::ConfigError) -> Self {
        LockError::Config(err.to_string())
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
            || err.kind() == redis::ErrorKind::AuthenticationFailed
        {
            LockError::Connection(err.to_string())
        } else {
            LockError::Protocol(err.to_string())
        }
    }
}
