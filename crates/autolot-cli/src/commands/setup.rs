use anyhow::{Context, Result};
use colored::Colorize;

use autolot_config::ProjectConfig;
use autolot_store::{connect, ensure_schema};

pub async fn cmd_setup(config: ProjectConfig) -> Result<()> {
    println!("Setting up autolot database tables...\n");

    println!("The following tables will be created:");
    println!("  - listings              - ingested records, one index per sort field");
    println!("  - __autolot_sync_state  - ingestion checkpoint and run status");
    println!();

    let client = connect(&config.postgres_connection_string()?)
        .await
        .context("Failed to connect to Postgres")?;
    ensure_schema(&client)
        .await
        .context("Failed to create tables")?;

    println!("{}", "Database tables created successfully!".green());
    println!("\nNext steps:");
    println!("  1. Run: autolot sync");
    println!("  2. Run: autolot serve\n");

    Ok(())
}
