//! API routes
//!
//! - [`health`] - liveness check
//! - [`webhook`] - signed provider webhooks (raw body)
//! - [`sync`] - sync triggers, run snapshots, cancellation
//! - [`ws`] - live run progress over WebSocket
//! - [`cost_links`] - cost configuration with synchronous recalculation

pub mod cost_links;
pub mod health;
pub mod sync;
pub mod webhook;
pub mod ws;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::state::AppState;

/// Custom request ID generator
#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Webhooks need the raw body for signature verification
        .route("/api/webhooks/{provider}", post(webhook::handle_webhook))
        // Sync control
        .route("/api/sync", post(sync::trigger_sync))
        .route("/api/sync/runs/{run_id}", get(sync::get_run))
        .route("/api/sync/runs/{run_id}/ws", get(ws::run_progress_ws))
        .route(
            "/api/sync/operations/{operation_id}/cancel",
            post(sync::cancel_sync),
        )
        // Cost configuration
        .route("/api/cost-links", post(cost_links::upsert_cost_link))
        // ========== Tower HTTP Middleware ==========
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(XRequestId))
        .with_state(state)
}
