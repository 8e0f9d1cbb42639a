//! Error types for the raw storage backends.

use thiserror::Error;

/// Result type for backend operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`RawStore`](super::RawStore) implementation.
///
/// Integrity failures are fatal: the store refuses to serve reads until the
/// damage is resolved out of band. Missing files at open time are not errors;
/// they mean "start empty".
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Checksum mismatch on the data file or a journal record.
    /// Never retried, never silently ignored.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Access after `close()`. Distinct from missing data so callers can
    /// never mistake a closed store for an empty one.
    #[error("backend no longer open")]
    Closed,

    /// Document or journal payload could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if this error indicates on-disk corruption.
    pub fn is_integrity(&self) -> bool {
        matches!(self, StoreError::Integrity(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_is_flagged() {
        let err = StoreError::Integrity("checksum mismatch".into());
        assert!(err.is_integrity());
        assert!(!StoreError::Closed.is_integrity());
    }

    #[test]
    fn display_contains_reason() {
        let err = StoreError::Integrity("data file digest mismatch".into());
        assert!(err.to_string().contains("data file digest mismatch"));
    }
}
