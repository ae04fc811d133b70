use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use ledgermeta_core::{
    pool::{LedgerPool, PoolError},
    types::LedgerRequest,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<LedgerPool>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: Arc<LedgerPool>, prometheus: Option<PrometheusHandle>) -> Self {
        Self { pool, prometheus }
    }
}

/// Body of `POST /request`.
#[derive(Debug, Deserialize)]
pub struct RequestBody {
    pub request: LedgerRequest,
    #[serde(default)]
    pub priority: i32,
}

type JsonResponse = (StatusCode, Json<Value>);

/// Maps a pool error onto an HTTP status.
///
/// Unfulfillable requests are the caller's problem, a missing or stopping pool is ours,
/// and anything that went wrong on the node is reported as a bad gateway.
#[must_use]
pub fn status_for(error: &PoolError) -> StatusCode {
    match error {
        PoolError::Unfulfillable => StatusCode::UNPROCESSABLE_ENTITY,
        PoolError::NoNodeAvailable | PoolError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(error: &PoolError) -> JsonResponse {
    (
        status_for(error),
        Json(json!({
            "error": error.code(),
            "message": error.to_string(),
            "transient": error.is_transient(),
        })),
    )
}

/// Routes one ledger request through the pool and returns the node's `result`.
pub async fn handle_request(
    State(state): State<AppState>,
    Json(body): Json<RequestBody>,
) -> impl IntoResponse {
    debug!(command = %body.request.command, priority = body.priority, "request received");

    match state.pool.request(body.request, body.priority).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => error_response(&e),
    }
}

/// Returns the header of the latest ledger known to the pool.
pub async fn handle_current_ledger(State(state): State<AppState>) -> impl IntoResponse {
    match state.pool.current_ledger().await {
        Ok(header) => (StatusCode::OK, Json(header)),
        Err(e) => error_response(&e),
    }
}

#[allow(clippy::unused_async)]
pub async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.status())
}

#[allow(clippy::unused_async)]
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.pool.status();
    let healthy = status.online > 0 && !state.pool.is_shutdown();

    let health_status = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "sessions": {
            "online": status.online,
            "total": status.total,
        },
        "queue_depth": status.queue_depth,
        "timestamp": chrono::Utc::now().to_rfc3339()
    });

    (
        if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
        [("content-type", "application/json")],
        serde_json::to_string(&health_status).unwrap_or_default(),
    )
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics disabled".to_string(),
        ),
    }
}
