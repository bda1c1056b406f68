use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppResult;
use crate::models::{validate_id, ClickRequest, RecommendRequest, RecommendResponse, StatusResponse};

use super::extract::AppJson;
use super::AppState;

/// Handler for click events
pub async fn record_click(
    State(state): State<AppState>,
    AppJson(request): AppJson<ClickRequest>,
) -> AppResult<Json<StatusResponse>> {
    request.validate()?;
    state
        .recommender
        .record_click(&request.session_id, &request.item_id)
        .await?;

    tracing::debug!(session_id = %request.session_id, item_id = %request.item_id, "Click recorded");
    Ok(Json(StatusResponse::success(format!(
        "Recorded click on {}",
        request.item_id
    ))))
}

/// Handler for recommendation requests
pub async fn recommend(
    State(state): State<AppState>,
    AppJson(request): AppJson<RecommendRequest>,
) -> AppResult<Json<RecommendResponse>> {
    request.validate()?;
    let recommendation = state.recommender.recommend(&request.session_id).await?;

    let message = if recommendation.used_coldstart {
        "Cold-start recommendations (Thompson Sampling)"
    } else {
        "Personalized recommendations (sequence model)"
    };

    Ok(Json(RecommendResponse {
        session_id: request.session_id,
        recommendations: recommendation.items,
        used_coldstart: recommendation.used_coldstart,
        message: message.to_string(),
    }))
}

/// Erases a session's click history
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    validate_id("session_id", &session_id)?;
    state.recommender.delete_session(&session_id).await?;

    tracing::info!(session_id = %session_id, "Session deleted");
    Ok(Json(StatusResponse::success(format!(
        "Deleted session {}",
        session_id
    ))))
}
