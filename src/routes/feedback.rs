use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::models::{FeedbackRequest, StatusResponse};

use super::extract::AppJson;
use super::AppState;

/// Handler for feedback on a served recommendation list
pub async fn record_feedback(
    State(state): State<AppState>,
    AppJson(request): AppJson<FeedbackRequest>,
) -> AppResult<Json<StatusResponse>> {
    request.validate()?;

    let hit = state
        .recommender
        .record_feedback(&request.recommended_items, request.clicked_item.as_deref());

    tracing::debug!(session_id = %request.session_id, hit, "Feedback recorded");
    let outcome = if hit { "hit" } else { "miss" };
    Ok(Json(StatusResponse::success(format!(
        "Feedback recorded ({})",
        outcome
    ))))
}
