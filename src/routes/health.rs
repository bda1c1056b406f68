use axum::{extract::State, http::StatusCode, Json};

use crate::models::HealthResponse;

use super::AppState;

/// Probes the session store, vector index and model
///
/// Always answers 200; a failing component is reported as `degraded` in the body.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let components = state.recommender.health().await;
    if !components.all_healthy() {
        tracing::warn!(?components, "Health check degraded");
    }
    (StatusCode::OK, Json(components.into()))
}
