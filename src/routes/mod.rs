use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

pub mod extract;
pub mod feedback;
pub mod health;
pub mod metrics;
pub mod sessions;
pub mod state;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(liveness))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(
            // Outermost first: the request id must exist before the trace span is made
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/click", post(sessions::record_click))
        .route("/recommend", post(sessions::recommend))
        .route("/sessions/:session_id", delete(sessions::delete_session))
        .route("/feedback", post(feedback::record_feedback))
        .route("/metrics", get(metrics::get_metrics))
        .route("/bandit/arms", get(metrics::get_bandit_arms))
        .route("/health", get(health::health))
}

/// Service banner
async fn root() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Process liveness; does not probe dependencies
async fn liveness() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
