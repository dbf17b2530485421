use thiserror::Error;

/// Errors that can occur in autolot-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("malformed upstream record: {0}")]
    MalformedRecord(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedRecord(message.into())
    }

    /// Whether this error is a caller mistake that should not be retried.
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Error::InvalidQuery(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
