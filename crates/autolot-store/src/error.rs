use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Query(#[from] autolot_core::Error),

    #[error("write rejected: {0}")]
    WriteRejected(String),
}

impl StoreError {
    /// Whether the caller asked for something invalid (as opposed to the
    /// store failing).
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, StoreError::Query(e) if e.is_invalid_query())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let msg = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            StoreError::Postgres(msg)
        } else {
            StoreError::Postgres(e.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
