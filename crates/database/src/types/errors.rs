//! Error types for the database layer

use roomcast_relay::RelayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database query error: {0}")]
    QueryError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::QueryError(err.to_string())
    }
}

/// Storage write failures are persistence errors for the flush worker;
/// anything else means the store itself is unreachable.
impl From<DatabaseError> for RelayError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::QueryError(_) | DatabaseError::ValidationError(_) => {
                RelayError::persistence(err.to_string())
            }
            DatabaseError::ConnectionError(_) | DatabaseError::MigrationError(_) => {
                RelayError::queue(err.to_string())
            }
        }
    }
}
