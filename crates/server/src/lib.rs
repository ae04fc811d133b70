//! HTTP front end for the ledger node pool.
//!
//! The binary in `main.rs` wires configuration, logging and metrics around the
//! handlers in [`router`]; [`create_app`] is exposed so tests can drive the full
//! router without binding a socket.

pub mod middleware;
pub mod router;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use router::AppState;

/// Upper bound on request bodies. Ledger requests are small JSON objects.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Builds the HTTP router over a started pool.
pub fn create_app(state: AppState) -> Router {
    let (set_request_id, propagate_request_id) = middleware::create_request_id_layers();

    Router::new()
        .route("/request", post(router::handle_request))
        .route("/ledger/current", get(router::handle_current_ledger))
        .route("/status", get(router::handle_status))
        .route("/health", get(router::handle_health))
        .route("/metrics", get(router::handle_metrics))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::create_trace_layer())
        .layer(propagate_request_id)
        .layer(set_request_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use ledgermeta_core::{pool::LedgerPoolBuilder, types::NodeConfig};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// An app over a pool that was never started, so no session is online.
    fn create_idle_app() -> Router {
        let pool = LedgerPoolBuilder::new()
            .node(NodeConfig::new("ws://127.0.0.1:1"))
            .build()
            .expect("valid test pool");
        create_app(AppState::new(Arc::new(pool), None))
    }

    #[tokio::test]
    async fn test_status_route_registered() {
        let request = Request::builder().uri("/status").body(Body::empty()).unwrap();
        let response = create_idle_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(&middleware::X_REQUEST_ID).is_some());
    }

    #[tokio::test]
    async fn test_health_unavailable_without_sessions() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = create_idle_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_request_route_rejects_malformed_body() {
        let request = Request::builder()
            .uri("/request")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"priority": 1}"#))
            .unwrap();
        let response = create_idle_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_route_not_found() {
        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let response = create_idle_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
