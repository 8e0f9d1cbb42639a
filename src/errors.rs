//! Crate-level error types.

use thiserror::Error;

use crate::backend::StoreError;

/// Result type for database, table, query, and entry operations
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by the database layer.
///
/// Missing data is deliberately not represented here: absent rows read as
/// empty documents and absent nested fields read as null.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failure in the raw storage backend
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Caller bug: a contract violation such as writing a non-document value
    /// to a data table or assigning over a computed join field
    #[error("type error: {0}")]
    Type(String),
}

pub(crate) fn type_error(msg: impl Into<String>) -> DbError {
    DbError::Type(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_convert() {
        let err: DbError = StoreError::Closed.into();
        assert!(matches!(err, DbError::Store(StoreError::Closed)));
    }

    #[test]
    fn type_error_display() {
        let err = type_error("value must be a document");
        assert!(err.to_string().contains("value must be a document"));
    }
}
