//! Notification log handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AuthenticatedParty;
use crate::error::{ApiError, ApiResult};
use crate::models::ApiResponse;
use crate::notification::Notification;
use crate::state::AppState;

/// GET /notifications/unread - Oldest first
pub async fn unread(
    State(state): State<AppState>,
    party: AuthenticatedParty,
) -> ApiResult<Json<ApiResponse<Vec<Notification>>>> {
    let notifications = state
        .notification_service
        .unread(party.party_id)
        .await?;
    Ok(Json(ApiResponse::ok(notifications)))
}

/// POST /notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    party: AuthenticatedParty,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let owned = state
        .notification_service
        .mark_as_read(party.party_id, notification_id)
        .await?;

    if !owned {
        return Err(ApiError::NotFound(format!(
            "Notification {} not found",
            notification_id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
