//! Ingest API: the ledger feed and operators POST here.
//!
//! Every entry of a ledger body is validated independently; bad entries are
//! reported back and logged, good ones are handed to the engine as one batch.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use skyscan_core::{now, parse_ledger_str};

use crate::web::AppState;

type ApiResponse = (StatusCode, Json<Value>);

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct OverrideRequest {
    id: Option<String>,
}

// ---------------------------------------------------------------------------
// Auth helper
// ---------------------------------------------------------------------------

/// Validate bearer token if auth is configured. Returns Err response on failure.
pub(crate) fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiResponse> {
    let Some(expected) = &state.auth_token else {
        return Ok(());
    };

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if let Some(token) = auth_header.strip_prefix("Bearer ") {
        if token == expected {
            return Ok(());
        }
    }

    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "invalid or missing bearer token"})),
    ))
}

fn engine_stopped() -> ApiResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "engine is not running"})),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/ledger: apply a ledger update.
pub async fn api_ingest_ledger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> ApiResponse {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }
    if !state.engine.is_running() {
        return engine_stopped();
    }

    let parsed = match parse_ledger_str(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable ledger body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            );
        }
    };

    for r in &parsed.rejected {
        tracing::warn!(entry = %r.entry, reason = %r.reason, "dropped aircraft report");
    }

    let accepted = parsed.accepted.len();
    if accepted > 0 && state.engine.submit_ledger(parsed.accepted, now()).await.is_err() {
        return engine_stopped();
    }

    (
        StatusCode::OK,
        Json(json!({
            "accepted": accepted,
            "rejected": parsed.rejected.len(),
            "errors": parsed.rejected,
        })),
    )
}

/// POST /api/v1/override: pin a target id, or clear with `{"id": null}`.
pub async fn api_override(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OverrideRequest>,
) -> ApiResponse {
    if let Err(resp) = check_auth(&state, &headers) {
        return resp;
    }

    let id = body.id.and_then(|id| skyscan_core::normalize_id(&id));
    if state.engine.set_override(id.clone(), now()).await.is_err() {
        return engine_stopped();
    }

    (StatusCode::OK, Json(json!({"override": id})))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::web::build_router;
    use crate::web::test_support::test_app;

    fn post(uri: &str, body: String, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn report(id: &str, lat: f64) -> Value {
        json!({
            "id": id,
            "latitude": lat,
            "longitude": 0.0,
            "altitude": 3000.0,
            "timestamp": now(),
        })
    }

    #[tokio::test]
    async fn test_ingest_ledger_partial_rejection() {
        let app = test_app(None);
        let mut status = app.state.engine.subscribe();
        let router = build_router(app.state.clone());

        let body = json!([
            report("a1b2c3", 0.09),
            {"id": "BAD001", "latitude": 95.0, "longitude": 0.0, "altitude": 1000.0, "timestamp": 1.0},
            {"id": "BAD002", "longitude": 0.0, "altitude": 1000.0, "timestamp": 1.0},
        ]);
        let response = router
            .oneshot(post("/api/v1/ledger", body.to_string(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["rejected"], 2);
        assert_eq!(json["errors"][0]["entry"], "1");
        assert!(json["errors"][1]["reason"].as_str().unwrap().contains("latitude"));

        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.target_id.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(snapshot.target_id.as_deref(), Some("A1B2C3"));
    }

    #[tokio::test]
    async fn test_ingest_ledger_invalid_json() {
        let app = test_app(None);
        let response = build_router(app.state.clone())
            .oneshot(post("/api/v1/ledger", "{not json".into(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_requires_token() {
        let app = test_app(Some("s3cret"));
        let body = json!([report("A1B2C3", 0.09)]).to_string();

        let response = build_router(app.state.clone())
            .oneshot(post("/api/v1/ledger", body.clone(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = build_router(app.state.clone())
            .oneshot(post("/api/v1/ledger", body.clone(), Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = build_router(app.state.clone())
            .oneshot(post("/api/v1/ledger", body, Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ingest_after_shutdown_is_unavailable() {
        let app = test_app(None);
        let mut status = app.state.engine.subscribe();
        app.shutdown.send_replace(true);
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.last_command.is_some()),
        )
        .await
        .unwrap()
        .unwrap();

        let body = json!([report("A1B2C3", 0.09)]).to_string();
        let response = build_router(app.state.clone())
            .oneshot(post("/api/v1/ledger", body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_override_set_and_clear() {
        let app = test_app(None);
        let mut status = app.state.engine.subscribe();

        let body = json!([report("NEAR", 0.09), report("FAR", 0.15)]).to_string();
        build_router(app.state.clone())
            .oneshot(post("/api/v1/ledger", body, None))
            .await
            .unwrap();

        let response = build_router(app.state.clone())
            .oneshot(post("/api/v1/override", r#"{"id":"far"}"#.into(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["override"], "FAR");

        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.target_id.as_deref() == Some("FAR")),
        )
        .await
        .unwrap()
        .unwrap();

        let response = build_router(app.state.clone())
            .oneshot(post("/api/v1/override", r#"{"id":null}"#.into(), None))
            .await
            .unwrap();
        assert!(body_json(response).await["override"].is_null());

        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.target_id.as_deref() == Some("NEAR")),
        )
        .await
        .unwrap()
        .unwrap();
        let objects = app.transport.wait_on_topic("skyscan/c2/object", 3).await;
        assert!(objects.iter().any(|c| c["override"] == true));
    }
}
