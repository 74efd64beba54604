//! Error types for the delivery store.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the given request.
    #[error("delivery record not found")]
    NotFound,

    /// A record with the same `request_id` already exists.
    #[error("delivery record already exists for request {0}")]
    Duplicate(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Database(other.to_string()),
        }
    }
}

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;
