//! Read-only API routes over the latest engine status.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::web::AppState;

/// GET /api/health: liveness.
pub async fn api_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "engine_running": state.engine.is_running(),
    }))
}

/// GET /api/target: current target and the last pointing command.
pub async fn api_target(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.engine.status();
    let engine_state = if status.target_id.is_some() {
        "tracking"
    } else {
        "no_target"
    };

    Json(json!({
        "state": engine_state,
        "target_id": status.target_id,
        "override_id": status.override_id,
        "last_command": status.last_command,
        "tracked": status.tracked,
        "stats": status.stats,
        "updated_at": status.updated_at,
    }))
}

/// GET /api/ledger: prioritized ledger from the latest cycle.
pub async fn api_ledger(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.engine.status();
    Json(json!({
        "count": status.prioritized.len(),
        "aircraft": status.prioritized,
        "updated_at": status.updated_at,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
