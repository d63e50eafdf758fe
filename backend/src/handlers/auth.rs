//! Authentication HTTP handlers
//!
//! Registration and login for riders and captains, logout, and profile.

use axum::{extract::State, http::StatusCode, Json};

use super::{AuthenticatedParty, RiderParty};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AuthTokenResponse, LoginRequest, LogoutResponse, PartyRole, ProfileResponse,
    RegisterCaptainRequest, RegisterRiderRequest,
};
use crate::state::AppState;

/// POST /auth/riders/register
pub async fn register_rider(
    State(state): State<AppState>,
    Json(req): Json<RegisterRiderRequest>,
) -> ApiResult<(StatusCode, Json<AuthTokenResponse>)> {
    let tokens = state.auth_service.register_rider(req).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// POST /auth/captains/register
pub async fn register_captain(
    State(state): State<AppState>,
    Json(req): Json<RegisterCaptainRequest>,
) -> ApiResult<(StatusCode, Json<AuthTokenResponse>)> {
    let tokens = state.auth_service.register_captain(req).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// POST /auth/riders/login
pub async fn login_rider(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthTokenResponse>> {
    let tokens = state.auth_service.login(PartyRole::Rider, req).await?;
    Ok(Json(tokens))
}

/// POST /auth/captains/login
pub async fn login_captain(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthTokenResponse>> {
    let tokens = state.auth_service.login(PartyRole::Captain, req).await?;
    Ok(Json(tokens))
}

/// POST /auth/logout - Revoke the presented token
pub async fn logout(
    State(state): State<AppState>,
    party: AuthenticatedParty,
) -> ApiResult<Json<LogoutResponse>> {
    state.auth_service.logout(&party.token).await?;

    tracing::info!(party_id = %party.party_id, role = party.role.as_str(), "Logged out");

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    party: AuthenticatedParty,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state
        .auth_service
        .profile(party.party_id, party.role)
        .await?;
    Ok(Json(profile))
}

/// DELETE /auth/me - Riders only; soft delete
pub async fn delete_me(
    State(state): State<AppState>,
    RiderParty(party): RiderParty,
) -> Result<StatusCode, ApiError> {
    state
        .auth_service
        .delete_rider(party.party_id, &party.token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
