//! Web server: axum API for ledger ingest, overrides, and engine status.
//!
//! Handlers never touch the engine directly; they send inputs through the
//! `EngineHandle` and read the latest status snapshot from its watch channel.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::EngineHandle;

pub mod ingest;
pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub engine: EngineHandle,
    /// Bearer token required on POST routes, if set.
    pub auth_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::api_health))
        .route("/api/target", get(routes::api_target))
        .route("/api/ledger", get(routes::api_ledger))
        .route("/api/v1/ledger", post(ingest::api_ingest_ledger))
        .route("/api/v1/override", post(ingest::api_override))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the API on `host:port` until `shutdown` becomes true.
pub async fn serve(
    state: Arc<AppState>,
    host: String,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("skyscan-c2 listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}
