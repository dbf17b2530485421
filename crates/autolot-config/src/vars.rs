use crate::error::{ConfigError, ConfigResult};

/// Resolve `${VAR_NAME}` references against the process environment.
///
/// Text without references is returned unchanged. An unset variable is an
/// error naming it; an empty one resolves to the empty string.
pub fn resolve_env(value: &str) -> ConfigResult<String> {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedVariable {
                value: value.to_string(),
            })?;

        let name = after[..end].trim();
        let resolved = std::env::var(name).map_err(|_| ConfigError::UnsetVariable {
            name: name.to_string(),
        })?;
        result.push_str(&resolved);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
