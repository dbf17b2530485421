use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod components;
mod env;
mod http;

use autolot_config::ProjectConfig;
use cli::{CheckpointCommands, Cli, Commands};
use commands::QueryArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env (or .env.{ENV}) before anything reads the environment
    let loaded = env::load_dotenv_from_ancestors(cli.env.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autolot=info")),
        )
        .init();

    if let Some(path) = loaded {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Setup => commands::cmd_setup(config).await,
        Commands::Sync { fresh, max_pages } => commands::cmd_sync(config, fresh, max_pages).await,
        Commands::Status => commands::cmd_status(config).await,
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Show => commands::cmd_checkpoint_show(config).await,
            CheckpointCommands::Set {
                last_page,
                total_processed,
                yes,
            } => commands::cmd_checkpoint_set(config, last_page, total_processed, yes).await,
            CheckpointCommands::Clear { yes } => commands::cmd_checkpoint_clear(config, yes).await,
        },
        Commands::Query {
            sort,
            direction,
            page,
            page_size,
            filters,
        } => {
            let args = QueryArgs {
                sort,
                direction,
                page,
                page_size,
                filters,
            };
            commands::cmd_query(config, args).await
        }
        Commands::Serve { listen } => commands::cmd_serve(config, listen).await,
    }
}

fn load_config(path: &Path) -> Result<ProjectConfig> {
    ProjectConfig::load(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}
