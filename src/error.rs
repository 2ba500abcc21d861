//! Error types for watch sessions and store clients.

use thiserror::Error;

/// Main error type for watch operations.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key not found: {key}")]
    KeyNotFound {
        key: String,
        /// Store index at the time of the failed read, if reported.
        index: Option<u64>,
    },

    #[error("Key already exists: {0}")]
    NodeExists(String),

    #[error("Compare failed for {key}: expected {expected:?}, found {found:?}")]
    CompareFailed {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Watch stopped by user")]
    StoppedByUser,

    #[error("Event index cleared: requested {requested}, oldest retained {oldest}")]
    IndexCleared { requested: u64, oldest: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl WatchError {
    /// True for a read of a key that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WatchError::KeyNotFound { .. })
    }

    /// Store index carried by a not-found error, usable as a baseline version.
    pub fn index_hint(&self) -> Option<u64> {
        match self {
            WatchError::KeyNotFound { index, .. } => *index,
            _ => None,
        }
    }

    /// True when a watch call returned because its caller asked it to.
    pub fn is_stopped_by_user(&self) -> bool {
        matches!(self, WatchError::StoppedByUser)
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(e: serde_json::Error) -> Self {
        WatchError::Decode(e.to_string())
    }
}

/// Result type for watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;
