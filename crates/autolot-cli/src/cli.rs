use std::path::PathBuf;

use clap::{Parser, Subcommand};

use autolot_config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "autolot")]
#[command(about = "Ingest auction listings and serve them sorted and paged")]
#[command(version)]
pub struct Cli {
    /// Path to autolot.toml config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Environment to load (loads .env.{ENV} instead of .env)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the listings and sync state tables
    Setup,

    /// Run one ingestion invocation
    Sync {
        /// Ignore any checkpoint and start from page 1
        #[arg(long)]
        fresh: bool,

        /// Stop after this many pages (the next sync resumes)
        #[arg(long)]
        max_pages: Option<u64>,
    },

    /// Show current sync status
    Status,

    /// Inspect or override the ingestion checkpoint
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Fetch one page of the sorted catalog
    Query {
        /// Field to sort by (price, year, mileage, created_at, name)
        #[arg(long)]
        sort: Option<String>,

        /// Sort direction (asc or desc)
        #[arg(long)]
        direction: Option<String>,

        /// Page number, starting at 1
        #[arg(long)]
        page: Option<i64>,

        /// Records per page
        #[arg(long)]
        page_size: Option<i64>,

        /// Filter as field=value, field_min=value or field_max=value
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },

    /// Start the HTTP API and the sync controller
    Serve {
        /// Address to listen on (overrides server.listen)
        #[arg(long)]
        listen: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Print the stored checkpoint
    Show,

    /// Move the resume point
    Set {
        /// Last page considered committed
        #[arg(long)]
        last_page: u64,

        /// Records processed so far
        #[arg(long)]
        total_processed: u64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete the checkpoint so the next sync starts at page 1
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected field=value, got '{}'", raw)),
    }
}
