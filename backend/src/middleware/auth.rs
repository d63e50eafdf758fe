//! Authentication middleware
//!
//! Extractors that verify the bearer token and resolve the calling party.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Query},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthError, AuthService};
use crate::error::ApiError;
use crate::models::PartyRole;

/// Party resolved from a valid, non-revoked bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedParty {
    pub party_id: Uuid,
    pub role: PartyRole,
    /// Raw token, kept so logout can revoke it
    pub token: String,
}

/// Error response for authentication failures
#[derive(Debug, Serialize)]
struct AuthRejection {
    error: AuthRejectionDetails,
}

#[derive(Debug, Serialize)]
struct AuthRejectionDetails {
    code: String,
    message: String,
}

impl AuthRejection {
    fn new(code: &str, message: &str) -> Self {
        Self {
            error: AuthRejectionDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        self.with_status(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer header first, then `?token=` (browsers cannot set headers on WebSocket upgrades).
async fn bearer_token<S: Send + Sync>(parts: &mut Parts, state: &S) -> Option<String> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await
    {
        return Some(bearer.token().to_string());
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedParty
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state).await.ok_or_else(|| {
            AuthRejection::new(
                "MISSING_TOKEN",
                "Authorization header with Bearer token required",
            )
            .into_response()
        })?;

        let auth_service = Arc::<AuthService>::from_ref(state);

        let principal = auth_service.authenticate(&token).await.map_err(|e| match e {
            AuthError::TokenExpired => {
                AuthRejection::new("TOKEN_EXPIRED", "Token has expired").into_response()
            }
            AuthError::TokenRevoked => {
                AuthRejection::new("TOKEN_REVOKED", "Token has been revoked").into_response()
            }
            AuthError::InvalidToken(_) => {
                AuthRejection::new("INVALID_TOKEN", "Invalid token").into_response()
            }
            AuthError::AccountDisabled => {
                AuthRejection::new("ACCOUNT_DISABLED", "Account is disabled").into_response()
            }
            other => ApiError::from(other).into_response(),
        })?;

        Ok(AuthenticatedParty {
            party_id: principal.party_id,
            role: principal.role,
            token,
        })
    }
}

/// Requires a rider token
#[derive(Debug, Clone)]
pub struct RiderParty(pub AuthenticatedParty);

#[async_trait]
impl<S> FromRequestParts<S> for RiderParty
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let party = AuthenticatedParty::from_request_parts(parts, state).await?;

        if party.role != PartyRole::Rider {
            return Err(AuthRejection::new("FORBIDDEN", "Rider access required")
                .with_status(StatusCode::FORBIDDEN));
        }

        Ok(RiderParty(party))
    }
}

/// Requires a captain token
#[derive(Debug, Clone)]
pub struct CaptainParty(pub AuthenticatedParty);

#[async_trait]
impl<S> FromRequestParts<S> for CaptainParty
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let party = AuthenticatedParty::from_request_parts(parts, state).await?;

        if party.role != PartyRole::Captain {
            return Err(AuthRejection::new("FORBIDDEN", "Captain access required")
                .with_status(StatusCode::FORBIDDEN));
        }

        Ok(CaptainParty(party))
    }
}
