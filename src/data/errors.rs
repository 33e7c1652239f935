use thiserror::Error;

/// Error types for market-data and result-store operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No data available for {what} on {date}")]
    NoData { what: String, date: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Data validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for data operations
pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    /// Create a validation error with field context
    pub fn validation_error<S: Into<String>>(field: S, message: S) -> Self {
        DataError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the backing store could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            DataError::Database(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Tls(_)
            )
        )
    }
}
