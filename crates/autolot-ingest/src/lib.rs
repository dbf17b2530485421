//! Resumable bulk ingestion from a paged upstream into the record store.

mod config;
mod controller;
mod error;
mod ingestor;
mod report;

pub use config::IngestConfig;
pub use controller::{SyncController, SyncHandle};
pub use error::{IngestError, IngestResult};
pub use ingestor::{Ingestor, RunControl, RunProgress};
pub use report::{
    CompletionReason, RunOutcome, RunReport, SuspendReason, SyncRequest, SyncResponse, SyncStatus,
};
