use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use autolot_core::{QueryLimits, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use crate::error::{ConfigError, ConfigResult};
use crate::validation::validate_project;
use crate::vars::resolve_env;

pub const DEFAULT_CONFIG_PATH: &str = "autolot.toml";

/// Project configuration from autolot.toml
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub postgres: PostgresConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub query: QuerySection,
    #[serde(default)]
    pub server: ServerSection,
}

impl ProjectConfig {
    /// Parse and validate a project config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: ProjectConfig = toml::from_str(toml_str)?;
        validate_project(&config)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Get the resolved Postgres connection string.
    pub fn postgres_connection_string(&self) -> ConfigResult<String> {
        resolve_env(&self.postgres.connection_string)
    }

    pub fn source_base_url(&self) -> ConfigResult<String> {
        resolve_env(&self.source.base_url)
    }

    /// Get the resolved upstream API key, if one is configured.
    pub fn source_api_key(&self) -> ConfigResult<Option<String>> {
        match &self.source.api_key {
            Some(key) => {
                let key = resolve_env(key)?;
                Ok(Some(key).filter(|k| !k.is_empty()))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Upstream listing API.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    /// Sent as a bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra query parameters sent with every page request.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: FieldsConfig,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_per_page() -> u32 {
    200
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Dotted paths into upstream records.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    pub id: String,
    pub price: String,
    pub year: String,
    pub mileage: String,
    pub created_at: String,
    pub name: String,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            id: "id".into(),
            price: "price".into(),
            year: "year".into(),
            mileage: "mileage".into(),
            created_at: "created_at".into(),
            name: "title".into(),
        }
    }
}

impl FieldsConfig {
    pub(crate) fn paths(&self) -> [(&'static str, &str); 6] {
        [
            ("id", &self.id),
            ("price", &self.price),
            ("year", &self.year),
            ("mileage", &self.mileage),
            ("created_at", &self.created_at),
            ("name", &self.name),
        ]
    }
}

/// Ingestion loop tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub stream: String,
    pub upsert_batch_size: usize,
    pub empty_page_threshold: u32,
    pub page_floor: u64,
    pub page_lookahead: u64,
    pub max_fetch_retries: u32,
    pub retry_base_delay_ms: u64,
    pub freshness_window_secs: u64,
    pub stale_run_after_secs: u64,
    pub completion_threshold: Option<f64>,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            stream: "listings".into(),
            upsert_batch_size: 1000,
            empty_page_threshold: 20,
            page_floor: 2000,
            page_lookahead: 5000,
            max_fetch_retries: 3,
            retry_base_delay_ms: 1000,
            freshness_window_secs: 24 * 60 * 60,
            stale_run_after_secs: 180,
            completion_threshold: None,
        }
    }
}

impl IngestSection {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn stale_run_after(&self) -> Duration {
        Duration::from_secs(self.stale_run_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            cache_ttl_secs: 30,
            cache_capacity: 512,
        }
    }
}

impl QuerySection {
    pub fn limits(&self) -> QueryLimits {
        QueryLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub listen: String,
    /// Start a resuming sync this often. Unset disables the timer.
    pub sync_interval_secs: Option<u64>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            sync_interval_secs: None,
        }
    }
}

impl ServerSection {
    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
