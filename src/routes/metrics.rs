use axum::{extract::State, Json};

use crate::models::{BanditArmsResponse, MetricsResponse};

use super::AppState;

pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(state.recommender.metrics().into())
}

/// Bandit arms ordered by estimated click-through rate, best first
pub async fn get_bandit_arms(State(state): State<AppState>) -> Json<BanditArmsResponse> {
    let mut arms = state.recommender.bandit_stats();
    arms.sort_by(|a, b| b.estimated_ctr.total_cmp(&a.estimated_ctr));
    Json(BanditArmsResponse { arms })
}
