use thiserror::Error;

use autolot_source::FetchError;
use autolot_store::StoreError;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("another run took over stream '{stream}'")]
    LeaseLost { stream: String },

    #[error("sync controller is not running")]
    ControllerClosed,
}

pub type IngestResult<T> = Result<T, IngestError>;
