use anyhow::{Context, Result};
use colored::Colorize;

use autolot_config::ProjectConfig;
use autolot_core::{Checkpoint, RunStatus};
use autolot_ingest::SyncResponse;
use autolot_store::CheckpointStore;

use crate::components;

pub async fn cmd_status(config: ProjectConfig) -> Result<()> {
    let store = components::checkpoint_store(&config).await?;
    let stream = config.ingest.stream.as_str();

    let versioned = store
        .load_versioned(stream)
        .await
        .context("Failed to read sync state")?;

    let checkpoint = match (versioned.version, versioned.checkpoint) {
        (None, _) => {
            println!("No sync state found. Run 'autolot sync' to start ingesting.");
            return Ok(());
        }
        (Some(_), None) => {
            println!(
                "{}",
                "Stored sync state is unreadable; the next sync starts at page 1.".yellow()
            );
            return Ok(());
        }
        (Some(_), Some(checkpoint)) => checkpoint,
    };

    print_checkpoint(stream, &checkpoint);

    let response = SyncResponse::from_checkpoint(Some(&checkpoint));
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn print_checkpoint(stream: &str, checkpoint: &Checkpoint) {
    let status = match checkpoint.status {
        RunStatus::Completed => checkpoint.status.as_str().green(),
        RunStatus::Failed => checkpoint.status.as_str().red(),
        RunStatus::Idle | RunStatus::Running => checkpoint.status.as_str().yellow(),
    };

    println!("\nSync Status ({}):", stream);
    println!("{:-<60}", "");
    println!("{:<20} {}", "Run", checkpoint.run_id);
    println!("{:<20} {}", "Status", status);
    println!("{:<20} {}", "Last page", checkpoint.last_page);
    println!("{:<20} {}", "Next page", checkpoint.resume_page());
    if checkpoint.empty_streak > 0 {
        println!("{:<20} {}", "Empty streak", checkpoint.empty_streak);
    }
    println!("{:<20} {}", "Processed", checkpoint.total_processed);
    if let Some(total) = checkpoint.known_total {
        println!("{:<20} {}", "Upstream total", total);
    }
    println!("{:<20} {}", "Started", checkpoint.start_time.to_rfc3339());
    println!("{:<20} {}", "Updated", checkpoint.last_update_time.to_rfc3339());
    if let Some(error) = &checkpoint.last_error {
        println!("{:<20} {}", "Last error", error.red());
    }
    println!();
}
