use std::path::PathBuf;

use anyhow::{Context, Result};

/// Name of the env file for an optional environment (`.env` or `.env.{name}`).
pub fn env_file_name(env: Option<&str>) -> String {
    match env {
        Some(name) => format!(".env.{}", name),
        None => ".env".to_string(),
    }
}

/// Load the env file from the current directory or the closest ancestor.
///
/// Returns the path that was loaded. A missing `.env` is fine, since values
/// may come from the real environment; a missing `.env.{name}` that was asked
/// for by name is an error.
pub fn load_dotenv_from_ancestors(env: Option<&str>) -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let file_name = env_file_name(env);

    let mut current = cwd.as_path();
    loop {
        let env_path = current.join(&file_name);
        if env_path.exists() {
            dotenvy::from_path(&env_path)
                .with_context(|| format!("Failed to load {}", env_path.display()))?;
            return Ok(Some(env_path));
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    if env.is_some() {
        anyhow::bail!(
            "No {} file found.\n\n\
            Searched from {} to filesystem root.",
            file_name,
            cwd.display()
        );
    }
    Ok(None)
}
