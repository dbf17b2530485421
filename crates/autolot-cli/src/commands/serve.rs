use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use autolot_config::ProjectConfig;
use autolot_ingest::{Ingestor, SyncController};
use autolot_store::CachedRecordStore;

use crate::components;
use crate::http::{self, AppState};

pub async fn cmd_serve(config: ProjectConfig, listen: Option<String>) -> Result<()> {
    let listen = listen.unwrap_or_else(|| config.server.listen.clone());

    let source = components::http_source(&config)?;
    let records = Arc::new(CachedRecordStore::new(
        components::record_store(&config).await?,
        components::cache_config(&config.query),
    ));
    let checkpoints = components::checkpoint_store(&config).await?;

    let ingestor = Ingestor::new(
        source,
        records.clone(),
        checkpoints,
        components::ingest_config(&config),
    );
    let (sync, controller) =
        SyncController::spawn(Arc::new(ingestor), config.server.sync_interval());

    let app = http::router(Arc::new(AppState {
        records,
        limits: config.query.limits(),
        sync: sync.clone(),
    }));

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!(listen = %listen, sync_interval = ?config.server.sync_interval(), "Serving");
    println!("{}", format!("Listening on http://{}", listen).green());

    http::serve(listener, app, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down sync controller");
    match sync.shutdown().await {
        Ok(Some(report)) => info!(
            run_id = %report.run_id,
            last_page = report.last_page,
            total_processed = report.total_processed,
            "Active run suspended"
        ),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Sync controller already stopped"),
    }
    controller.await.context("Sync controller panicked")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
