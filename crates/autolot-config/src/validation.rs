use crate::error::{ConfigError, ConfigResult};
use crate::project::{IngestSection, ProjectConfig, QuerySection, SourceConfig};

/// Validate a project configuration.
///
/// `${VAR}` references are not resolved here, so a config can be checked on
/// a machine that does not hold the secrets.
pub fn validate_project(config: &ProjectConfig) -> ConfigResult<()> {
    validate_required(config)?;
    validate_source(&config.source)?;
    validate_ingest(&config.ingest)?;
    validate_query(&config.query)?;
    Ok(())
}

fn validate_required(config: &ProjectConfig) -> ConfigResult<()> {
    if config.postgres.connection_string.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "postgres.connection_string".into(),
        });
    }
    if config.source.base_url.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "source.base_url".into(),
        });
    }
    Ok(())
}

fn validate_source(source: &SourceConfig) -> ConfigResult<()> {
    if source.per_page == 0 {
        return Err(ConfigError::invalid("source.per_page", "must be at least 1"));
    }
    if source.timeout_ms == 0 {
        return Err(ConfigError::invalid("source.timeout_ms", "must be at least 1"));
    }
    for (name, path) in source.fields.paths() {
        if path.trim().is_empty() || path.split('.').any(str::is_empty) {
            return Err(ConfigError::invalid(
                &format!("source.fields.{}", name),
                format!("'{}' is not a dotted path", path),
            ));
        }
    }
    Ok(())
}

fn validate_ingest(ingest: &IngestSection) -> ConfigResult<()> {
    if ingest.stream.trim().is_empty() {
        return Err(ConfigError::invalid("ingest.stream", "must not be empty"));
    }
    if ingest.upsert_batch_size == 0 {
        return Err(ConfigError::invalid(
            "ingest.upsert_batch_size",
            "must be at least 1",
        ));
    }
    if ingest.empty_page_threshold == 0 {
        return Err(ConfigError::invalid(
            "ingest.empty_page_threshold",
            "must be at least 1",
        ));
    }
    if let Some(threshold) = ingest.completion_threshold {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "ingest.completion_threshold",
                format!("must be in (0, 1], got {}", threshold),
            ));
        }
    }
    Ok(())
}

fn validate_query(query: &QuerySection) -> ConfigResult<()> {
    if query.max_page_size == 0 {
        return Err(ConfigError::invalid(
            "query.max_page_size",
            "must be at least 1",
        ));
    }
    if query.default_page_size == 0 || query.default_page_size > query.max_page_size {
        return Err(ConfigError::invalid(
            "query.default_page_size",
            format!("must be in 1..={}", query.max_page_size),
        ));
    }
    Ok(())
}
