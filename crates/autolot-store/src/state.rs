//! Durable ingestion state.
//!
//! One row per stream in `__autolot_sync_state`, holding the checkpoint as
//! JSON text and a version number that every write bumps. Writers that must
//! not overlap go through [`CheckpointStore::compare_and_set`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_postgres::Client;
use tracing::{debug, warn};

use autolot_core::Checkpoint;

use crate::connect::connect;
use crate::error::StoreResult;
use crate::schema::ensure_schema;

/// The checkpoint of a stream together with the row version it was read at.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VersionedCheckpoint {
    /// `None` when the stream has no row yet.
    pub version: Option<i64>,
    /// `None` when there is no row or its contents could not be parsed.
    pub checkpoint: Option<Checkpoint>,
}

impl VersionedCheckpoint {
    fn from_row(stream: &str, version: i64, raw: &str) -> Self {
        let checkpoint = match Checkpoint::from_json(raw) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(stream, error = %e, "Ignoring malformed checkpoint");
                None
            }
        };
        Self {
            version: Some(version),
            checkpoint,
        }
    }
}

/// Persistence for ingestion checkpoints, one per stream.
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint and its row version. A row that fails to parse is
    /// returned with `checkpoint: None` so a writer can still replace it.
    fn load_versioned(
        &self,
        stream: &str,
    ) -> impl Future<Output = StoreResult<VersionedCheckpoint>> + Send;

    /// Write `checkpoint` only if the row is still at `expected` (`None`: the
    /// row must not exist). Returns the new version, or `None` if another
    /// writer got there first.
    fn compare_and_set(
        &self,
        stream: &str,
        expected: Option<i64>,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = StoreResult<Option<i64>>> + Send;

    /// Unconditional overwrite. Returns the new version.
    fn save(
        &self,
        stream: &str,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = StoreResult<i64>> + Send;

    /// Delete the stream's row. Returns whether one existed.
    fn clear(&self, stream: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Read the checkpoint, treating every failure as "no checkpoint".
    fn load(&self, stream: &str) -> impl Future<Output = Option<Checkpoint>> + Send {
        async move {
            match self.load_versioned(stream).await {
                Ok(versioned) => versioned.checkpoint,
                Err(e) => {
                    warn!(stream, error = %e, "Could not read checkpoint, starting fresh");
                    None
                }
            }
        }
    }
}

impl<T: CheckpointStore> CheckpointStore for Arc<T> {
    fn load_versioned(
        &self,
        stream: &str,
    ) -> impl Future<Output = StoreResult<VersionedCheckpoint>> + Send {
        (**self).load_versioned(stream)
    }

    fn compare_and_set(
        &self,
        stream: &str,
        expected: Option<i64>,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = StoreResult<Option<i64>>> + Send {
        (**self).compare_and_set(stream, expected, checkpoint)
    }

    fn save(
        &self,
        stream: &str,
        checkpoint: &Checkpoint,
    ) -> impl Future<Output = StoreResult<i64>> + Send {
        (**self).save(stream, checkpoint)
    }

    fn clear(&self, stream: &str) -> impl Future<Output = StoreResult<bool>> + Send {
        (**self).clear(stream)
    }
}

/// Checkpoint store backed by the `__autolot_sync_state` table.
pub struct PostgresCheckpointStore {
    client: Client,
}

impl PostgresCheckpointStore {
    pub async fn connect(connection_string: &str) -> StoreResult<Self> {
        let client = connect(connection_string).await?;
        Self::from_client(client).await
    }

    pub async fn from_client(client: Client) -> StoreResult<Self> {
        ensure_schema(&client).await?;
        Ok(Self { client })
    }
}

impl CheckpointStore for PostgresCheckpointStore {
    async fn load_versioned(&self, stream: &str) -> StoreResult<VersionedCheckpoint> {
        let row = self
            .client
            .query_opt(
                r#"
                SELECT state, version
                FROM __autolot_sync_state
                WHERE stream = $1
                "#,
                &[&stream],
            )
            .await?;

        Ok(match row {
            Some(row) => {
                let raw: String = row.get(0);
                VersionedCheckpoint::from_row(stream, row.get(1), &raw)
            }
            None => VersionedCheckpoint::default(),
        })
    }

    async fn compare_and_set(
        &self,
        stream: &str,
        expected: Option<i64>,
        checkpoint: &Checkpoint,
    ) -> StoreResult<Option<i64>> {
        let state = checkpoint.to_json()?;

        let row = match expected {
            Some(version) => {
                self.client
                    .query_opt(
                        r#"
                        UPDATE __autolot_sync_state
                        SET state = $2, version = version + 1, updated_at = NOW()
                        WHERE stream = $1 AND version = $3
                        RETURNING version
                        "#,
                        &[&stream, &state, &version],
                    )
                    .await?
            }
            None => {
                self.client
                    .query_opt(
                        r#"
                        INSERT INTO __autolot_sync_state (stream, state, version, updated_at)
                        VALUES ($1, $2, 1, NOW())
                        ON CONFLICT (stream) DO NOTHING
                        RETURNING version
                        "#,
                        &[&stream, &state],
                    )
                    .await?
            }
        };

        let version = row.map(|r| r.get::<_, i64>(0));
        if version.is_none() {
            debug!(stream, ?expected, "Checkpoint compare-and-set lost");
        }
        Ok(version)
    }

    async fn save(&self, stream: &str, checkpoint: &Checkpoint) -> StoreResult<i64> {
        let state = checkpoint.to_json()?;
        let row = self
            .client
            .query_one(
                r#"
                INSERT INTO __autolot_sync_state (stream, state, version, updated_at)
                VALUES ($1, $2, 1, NOW())
                ON CONFLICT (stream)
                DO UPDATE SET state = EXCLUDED.state,
                              version = __autolot_sync_state.version + 1,
                              updated_at = NOW()
                RETURNING version
                "#,
                &[&stream, &state],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn clear(&self, stream: &str) -> StoreResult<bool> {
        let deleted = self
            .client
            .execute(
                "DELETE FROM __autolot_sync_state WHERE stream = $1",
                &[&stream],
            )
            .await?;
        Ok(deleted > 0)
    }
}

/// In-memory checkpoint store. Rows are kept as raw text so tests can plant
/// malformed state.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    rows: Arc<Mutex<HashMap<String, (i64, String)>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store arbitrary text as the stream's state, bumping its version.
    pub fn put_raw(&self, stream: &str, raw: impl Into<String>) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let version = rows.get(stream).map_or(1, |(v, _)| v + 1);
        rows.insert(stream.to_string(), (version, raw.into()));
    }

    pub fn raw(&self, stream: &str) -> Option<String> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .map(|(_, raw)| raw.clone())
    }

    /// The parsed checkpoint; malformed text reads as `None`.
    pub fn get(&self, stream: &str) -> Option<Checkpoint> {
        self.raw(stream)
            .and_then(|raw| Checkpoint::from_json(&raw).ok())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn load_versioned(&self, stream: &str) -> StoreResult<VersionedCheckpoint> {
        let row = self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .cloned();

        Ok(match row {
            Some((version, raw)) => VersionedCheckpoint::from_row(stream, version, &raw),
            None => VersionedCheckpoint::default(),
        })
    }

    async fn compare_and_set(
        &self,
        stream: &str,
        expected: Option<i64>,
        checkpoint: &Checkpoint,
    ) -> StoreResult<Option<i64>> {
        let state = checkpoint.to_json()?;
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let current = rows.get(stream).map(|(v, _)| *v);
        if current != expected {
            return Ok(None);
        }

        let version = current.map_or(1, |v| v + 1);
        rows.insert(stream.to_string(), (version, state));
        Ok(Some(version))
    }

    async fn save(&self, stream: &str, checkpoint: &Checkpoint) -> StoreResult<i64> {
        let state = checkpoint.to_json()?;
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let version = rows.get(stream).map_or(1, |(v, _)| v + 1);
        rows.insert(stream.to_string(), (version, state));
        Ok(version)
    }

    async fn clear(&self, stream: &str) -> StoreResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(stream)
            .is_some())
    }
}
