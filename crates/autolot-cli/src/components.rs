//! Builds the runtime pieces from a project config.

use anyhow::{Context, Result};

use autolot_config::{FieldsConfig, ProjectConfig, QuerySection};
use autolot_ingest::IngestConfig;
use autolot_source::{FieldPaths, HttpPagedSource, HttpSourceConfig};
use autolot_store::{CacheConfig, PostgresCheckpointStore, PostgresRecordStore};

pub fn ingest_config(config: &ProjectConfig) -> IngestConfig {
    let ingest = &config.ingest;
    IngestConfig {
        stream: ingest.stream.clone(),
        upsert_batch_size: ingest.upsert_batch_size,
        empty_page_threshold: ingest.empty_page_threshold,
        page_floor: ingest.page_floor,
        page_lookahead: ingest.page_lookahead,
        max_fetch_retries: ingest.max_fetch_retries,
        retry_base_delay: ingest.retry_base_delay(),
        fetch_timeout: config.source.timeout(),
        freshness_window: ingest.freshness_window(),
        stale_run_after: ingest.stale_run_after(),
        completion_threshold: ingest.completion_threshold,
    }
}

pub fn field_paths(fields: &FieldsConfig) -> FieldPaths {
    FieldPaths {
        id: fields.id.clone(),
        price: fields.price.clone(),
        year: fields.year.clone(),
        mileage: fields.mileage.clone(),
        created_at: fields.created_at.clone(),
        name: fields.name.clone(),
    }
}

pub fn cache_config(query: &QuerySection) -> CacheConfig {
    CacheConfig {
        capacity: query.cache_capacity,
        ttl: query.cache_ttl(),
    }
}

/// Resolve secrets and build the upstream client settings.
pub fn source_config(config: &ProjectConfig) -> Result<HttpSourceConfig> {
    let source = &config.source;
    Ok(HttpSourceConfig {
        base_url: config
            .source_base_url()
            .context("Failed to resolve source.base_url")?,
        api_key: config
            .source_api_key()
            .context("Failed to resolve source.api_key")?,
        per_page: source.per_page,
        timeout: source.timeout(),
        filters: source
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        fields: field_paths(&source.fields),
    })
}

pub fn http_source(config: &ProjectConfig) -> Result<HttpPagedSource> {
    HttpPagedSource::new(source_config(config)?).context("Failed to build HTTP client")
}

pub async fn record_store(config: &ProjectConfig) -> Result<PostgresRecordStore> {
    let connection_string = config.postgres_connection_string()?;
    PostgresRecordStore::connect(&connection_string)
        .await
        .context("Failed to connect to Postgres")
}

pub async fn checkpoint_store(config: &ProjectConfig) -> Result<PostgresCheckpointStore> {
    let connection_string = config.postgres_connection_string()?;
    PostgresCheckpointStore::connect(&connection_string)
        .await
        .context("Failed to connect to Postgres")
}
