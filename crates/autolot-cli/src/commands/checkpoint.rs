use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use dialoguer::Confirm;

use autolot_config::ProjectConfig;
use autolot_core::{Checkpoint, RunStatus};
use autolot_store::CheckpointStore;

use crate::components;

pub async fn cmd_checkpoint_show(config: ProjectConfig) -> Result<()> {
    let store = components::checkpoint_store(&config).await?;

    match store.load(&config.ingest.stream).await {
        Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
        None => println!("No checkpoint for stream '{}'.", config.ingest.stream),
    }
    Ok(())
}

/// Overwrite the resume point. The run id of an existing checkpoint is kept
/// so the next sync continues the same run.
pub async fn cmd_checkpoint_set(
    config: ProjectConfig,
    last_page: u64,
    total_processed: u64,
    yes: bool,
) -> Result<()> {
    let store = components::checkpoint_store(&config).await?;
    let stream = config.ingest.stream.as_str();
    let now = Utc::now();

    let mut checkpoint = match store.load(stream).await {
        Some(existing) if existing.status == RunStatus::Running => {
            anyhow::bail!(
                "Run {} is marked running; stop it before moving its checkpoint",
                existing.run_id
            );
        }
        Some(existing) => existing,
        None => Checkpoint::start(now),
    };

    if !yes
        && !Confirm::new()
            .with_prompt(format!(
                "Set '{}' to resume after page {} with {} processed?",
                stream, last_page, total_processed
            ))
            .default(false)
            .interact()?
    {
        println!("Aborting.");
        return Ok(());
    }

    checkpoint.rewind(last_page, total_processed);
    checkpoint.status = RunStatus::Idle;
    checkpoint.last_error = None;
    checkpoint.touch(now);

    store
        .save(stream, &checkpoint)
        .await
        .context("Failed to save checkpoint")?;
    println!(
        "{}",
        format!("Next sync of '{}' starts at page {}.", stream, last_page + 1).green()
    );
    Ok(())
}

pub async fn cmd_checkpoint_clear(config: ProjectConfig, yes: bool) -> Result<()> {
    let store = components::checkpoint_store(&config).await?;
    let stream = config.ingest.stream.as_str();

    if !yes
        && !Confirm::new()
            .with_prompt(format!(
                "Delete the checkpoint of '{}'? The next sync starts at page 1.",
                stream
            ))
            .default(false)
            .interact()?
    {
        println!("Aborting.");
        return Ok(());
    }

    if store
        .clear(stream)
        .await
        .context("Failed to clear checkpoint")?
    {
        println!("{}", format!("Cleared checkpoint of '{}'.", stream).green());
    } else {
        println!("No checkpoint for stream '{}'.", stream);
    }
    Ok(())
}
