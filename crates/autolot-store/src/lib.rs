//! Storage for autolot: the listings table, its query path and the durable
//! ingestion state.

mod cache;
mod connect;
mod error;
mod memory;
mod records;
pub mod schema;
pub mod sql;
mod state;

pub use cache::{CacheConfig, CacheStats, CachedRecordStore};
pub use connect::{connect, TlsMode};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryRecordStore;
pub use records::{PostgresRecordStore, RecordStore};
pub use schema::ensure_schema;
pub use state::{
    CheckpointStore, MemoryCheckpointStore, PostgresCheckpointStore, VersionedCheckpoint,
};
