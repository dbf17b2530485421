use anyhow::Result;
use colored::Colorize;
use tracing::info;

use autolot_config::ProjectConfig;
use autolot_ingest::{Ingestor, RunOutcome, SyncRequest};

use crate::components;

pub async fn cmd_sync(config: ProjectConfig, fresh: bool, max_pages: Option<u64>) -> Result<()> {
    let source = components::http_source(&config)?;
    let records = components::record_store(&config).await?;
    let checkpoints = components::checkpoint_store(&config).await?;
    let ingestor = Ingestor::new(
        source,
        records,
        checkpoints,
        components::ingest_config(&config),
    );

    let report = ingestor
        .run(SyncRequest {
            resume: !fresh,
            max_pages,
        })
        .await;
    info!(
        run_id = %report.run_id,
        start_page = report.start_page,
        pages_fetched = report.pages_fetched,
        records_upserted = report.records_upserted,
        records_skipped = report.records_skipped,
        empty_pages = report.empty_pages,
        "Sync finished"
    );

    println!("{}", serde_json::to_string_pretty(&report.to_response())?);

    match &report.outcome {
        RunOutcome::Completed(reason) => {
            println!("{}", format!("Sync completed ({})", reason).green());
        }
        RunOutcome::Suspended(_) => {
            println!(
                "{}",
                "Sync suspended. Run 'autolot sync' again to resume.".yellow()
            );
        }
        RunOutcome::Skipped { active_run_id } => {
            println!(
                "{}",
                format!("Run {} is already active, nothing started.", active_run_id).yellow()
            );
        }
        RunOutcome::Failed { error } => {
            anyhow::bail!("Sync failed: {}", error);
        }
    }

    Ok(())
}
