//! Error types for pocketnotes-core

use thiserror::Error;

use crate::backend::BackendError;

/// Result type alias using pocketnotes-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pocketnotes-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Position-based access outside the current note sequence
    #[error("Index {index} out of range for {len} notes")]
    IndexOutOfRange { index: usize, len: usize },

    /// Internal store invariant was broken. Not recoverable.
    #[error("Note store invariant violated: {0}")]
    StoreInvariantViolation(String),

    /// A call against the remote service failed after all attempts
    #[error("Remote {operation} failed: {source}")]
    RemoteOperationFailed {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) const fn remote(operation: &'static str, source: BackendError) -> Self {
        Self::RemoteOperationFailed { operation, source }
    }

    /// Programmer errors that callers should abort on rather than handle.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreInvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invariant_violations_are_fatal() {
        assert!(Error::StoreInvariantViolation("poisoned".to_string()).is_fatal());
        assert!(!Error::IndexOutOfRange { index: 3, len: 1 }.is_fatal());
        assert!(!Error::remote("create note", BackendError::Unauthenticated).is_fatal());
    }

    #[test]
    fn remote_failure_names_operation() {
        let error = Error::remote("upload image", BackendError::Unavailable("offline".to_string()));
        let message = error.to_string();
        assert!(message.contains("upload image"));
        assert!(message.contains("offline"));
    }
}
