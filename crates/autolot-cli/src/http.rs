//! HTTP surface: catalog pages and ingestion triggers.
//!
//! ## Routes
//!
//! - `GET /listings` - one page of the sorted, filtered catalog.
//! - `POST /sync` - start (or report) an ingestion run.
//! - `GET /sync/status` - state of the current or last run.
//! - `POST /sync/stop` - stop the active run at the next page boundary.
//! - `GET /health` - `{ "ok": true }`.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, warn};

use autolot_core::{CatalogQuery, QueryLimits};
use autolot_ingest::{IngestError, SyncHandle, SyncRequest};
use autolot_store::RecordStore;

pub struct AppState<R> {
    pub records: R,
    pub limits: QueryLimits,
    pub sync: SyncHandle,
}

pub fn router<R: RecordStore + 'static>(state: Arc<AppState<R>>) -> Router {
    Router::new()
        .route("/listings", get(list_listings::<R>))
        .route("/sync", post(start_sync::<R>))
        .route("/sync/status", get(sync_status::<R>))
        .route("/sync/stop", post(stop_sync::<R>))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve `app` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn controller_error(e: IngestError) -> Response {
    error!(error = %e, "Sync controller unavailable");
    error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}

async fn list_listings<R: RecordStore + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let params = params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    let query = match CatalogQuery::from_params(params, state.limits) {
        Ok(query) => query,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.records.query_page(&query).await {
        Ok(page) => Json(page).into_response(),
        Err(e) if e.is_invalid_query() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            error!(error = %e, query = %query.signature(), "Catalog query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn start_sync<R: RecordStore + 'static>(
    State(state): State<Arc<AppState<R>>>,
    body: Bytes,
) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        match serde_json::from_slice::<SyncRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejected sync request");
                return error_response(StatusCode::BAD_REQUEST, format!("invalid body: {}", e));
            }
        }
    };

    match state.sync.start(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => controller_error(e),
    }
}

async fn sync_status<R: RecordStore + 'static>(State(state): State<Arc<AppState<R>>>) -> Response {
    match state.sync.status().await {
        Ok(response) => Json(response).into_response(),
        Err(e) => controller_error(e),
    }
}

async fn stop_sync<R: RecordStore + 'static>(State(state): State<Arc<AppState<R>>>) -> Response {
    match state.sync.stop().await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => controller_error(e),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}
