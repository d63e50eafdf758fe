//! Authentication service
//!
//! Email/password accounts for riders and captains, HS256 bearer tokens,
//! and a blacklist of revoked tokens keyed by the token's SHA-256 hash.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use super::jwt::{generate_token, verify_token, Claims, JwtError};
use super::password::{hash_password, verify_password};
use crate::models::{
    AuthTokenResponse, Captain, CaptainStatus, LoginRequest, PartyRole, ProfileResponse,
    RegisterCaptainRequest, RegisterRiderRequest, Rider, Vehicle,
};
use crate::store::{PartyStore, StoreError, TokenStore};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Account not found")]
    PartyNotFound,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token signing failed: {0}")]
    Jwt(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(_) => AuthError::EmailTaken,
            other => AuthError::Store(other.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::TokenExpired => AuthError::TokenExpired,
            JwtError::EncodingFailed(msg) => AuthError::Jwt(msg),
            JwtError::DecodingFailed(msg) | JwtError::InvalidToken(msg) => {
                AuthError::InvalidToken(msg)
            }
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(e: validator::ValidationErrors) -> Self {
        AuthError::Validation(e.to_string())
    }
}

/// Caller identity recovered from a verified, non-revoked token
#[derive(Debug, Clone)]
pub struct Principal {
    pub party_id: Uuid,
    pub role: PartyRole,
    pub claims: Claims,
}

/// Authentication service
pub struct AuthService {
    parties: Arc<dyn PartyStore>,
    tokens: Arc<dyn TokenStore>,
    jwt_secret: String,
    token_ttl_seconds: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        parties: Arc<dyn PartyStore>,
        tokens: Arc<dyn TokenStore>,
        jwt_secret: String,
        token_ttl_seconds: i64,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            parties,
            tokens,
            jwt_secret,
            token_ttl_seconds,
            bcrypt_cost,
        }
    }

    pub async fn register_rider(
        &self,
        request: RegisterRiderRequest,
    ) -> Result<AuthTokenResponse, AuthError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        if self.parties.rider_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let rider = Rider {
            id: Uuid::new_v4(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email,
            phone: request.phone,
            password_hash: hash_password(request.password, self.bcrypt_cost).await?,
            rating: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.parties.insert_rider(&rider).await?;

        tracing::info!(rider_id = %rider.id, "Rider registered");
        self.issue(rider.id, PartyRole::Rider)
    }

    pub async fn register_captain(
        &self,
        request: RegisterCaptainRequest,
    ) -> Result<AuthTokenResponse, AuthError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        if self.parties.captain_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let vehicle = request.vehicle;
        let captain = Captain {
            id: Uuid::new_v4(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            email,
            phone: request.phone,
            password_hash: hash_password(request.password, self.bcrypt_cost).await?,
            vehicle: Vehicle {
                vehicle_type: vehicle.vehicle_type,
                model: vehicle.model,
                plate: vehicle.plate.to_uppercase(),
                color: vehicle.color,
                capacity: vehicle.capacity,
                year: vehicle.year,
            },
            status: CaptainStatus::Inactive,
            latitude: None,
            longitude: None,
            location_updated_at: None,
            rating: None,
            created_at: now,
            updated_at: now,
        };
        self.parties.insert_captain(&captain).await?;

        tracing::info!(captain_id = %captain.id, "Captain registered");
        self.issue(captain.id, PartyRole::Captain)
    }

    /// Unknown email and wrong password produce the same error.
    pub async fn login(
        &self,
        role: PartyRole,
        request: LoginRequest,
    ) -> Result<AuthTokenResponse, AuthError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        let (party_id, password_hash) = match role {
            PartyRole::Rider => {
                let rider = self
                    .parties
                    .rider_by_email(&email)
                    .await?
                    .filter(|rider| !rider.deleted)
                    .ok_or(AuthError::InvalidCredentials)?;
                (rider.id, rider.password_hash)
            }
            PartyRole::Captain => {
                let captain = self
                    .parties
                    .captain_by_email(&email)
                    .await?
                    .ok_or(AuthError::InvalidCredentials)?;
                if captain.status == CaptainStatus::Banned {
                    return Err(AuthError::AccountDisabled);
                }
                (captain.id, captain.password_hash)
            }
        };

        if !verify_password(request.password, password_hash).await? {
            tracing::debug!(role = role.as_str(), "Login rejected: bad password");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(party_id = %party_id, role = role.as_str(), "Login succeeded");
        self.issue(party_id, role)
    }

    /// Revoke a bearer token. Safe to call twice.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.tokens.revoke(&hash_token(token), Utc::now()).await?;
        Ok(())
    }

    /// Verify signature and expiry, then reject blacklisted tokens and
    /// tokens whose account has since been deleted or banned.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = verify_token(token, &self.jwt_secret)?;

        if self.tokens.is_revoked(&hash_token(token)).await? {
            return Err(AuthError::TokenRevoked);
        }

        let party_id = claims.party_id()?;
        self.ensure_active(party_id, claims.role).await?;

        Ok(Principal {
            party_id,
            role: claims.role,
            claims,
        })
    }

    async fn ensure_active(&self, party_id: Uuid, role: PartyRole) -> Result<(), AuthError> {
        let active = match role {
            PartyRole::Rider => self
                .parties
                .rider_by_id(party_id)
                .await?
                .is_some_and(|rider| !rider.deleted),
            PartyRole::Captain => self
                .parties
                .captain_by_id(party_id)
                .await?
                .is_some_and(|captain| captain.status != CaptainStatus::Banned),
        };
        if active {
            Ok(())
        } else {
            tracing::debug!(party_id = %party_id, role = role.as_str(), "Token for disabled account");
            Err(AuthError::AccountDisabled)
        }
    }

    pub async fn profile(
        &self,
        party_id: Uuid,
        role: PartyRole,
    ) -> Result<ProfileResponse, AuthError> {
        match role {
            PartyRole::Rider => {
                let rider = self
                    .parties
                    .rider_by_id(party_id)
                    .await?
                    .filter(|rider| !rider.deleted)
                    .ok_or(AuthError::PartyNotFound)?;
                Ok(ProfileResponse::Rider(rider.into()))
            }
            PartyRole::Captain => {
                let captain = self
                    .parties
                    .captain_by_id(party_id)
                    .await?
                    .ok_or(AuthError::PartyNotFound)?;
                Ok(ProfileResponse::Captain(captain.into()))
            }
        }
    }

    /// Soft-delete a rider and revoke the token used for the request.
    pub async fn delete_rider(&self, rider_id: Uuid, token: &str) -> Result<(), AuthError> {
        if !self.parties.soft_delete_rider(rider_id).await? {
            return Err(AuthError::PartyNotFound);
        }
        self.logout(token).await?;
        tracing::info!(rider_id = %rider_id, "Rider account deleted");
        Ok(())
    }

    pub async fn purge_revoked(&self, retention: Duration) -> Result<u64, AuthError> {
        let purged = self
            .tokens
            .purge_revoked_before(Utc::now() - retention)
            .await?;
        Ok(purged)
    }

    fn issue(&self, party_id: Uuid, role: PartyRole) -> Result<AuthTokenResponse, AuthError> {
        let (token, claims) =
            generate_token(party_id, role, &self.jwt_secret, self.token_ttl_seconds)?;
        Ok(AuthTokenResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_at: claims.expires_at(),
            party_id,
            role,
        })
    }
}

/// Periodically drop blacklist entries older than `retention`.
pub async fn blacklist_purger(auth_service: Arc<AuthService>, retention: Duration, every: StdDuration) {
    tracing::info!(
        retention_hours = retention.num_hours(),
        "Starting token blacklist purger"
    );

    loop {
        tokio::time::sleep(every).await;

        match auth_service.purge_revoked(retention).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "Purged expired blacklist entries"),
            Err(e) => tracing::error!("Error purging token blacklist: {}", e),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// SHA-256 of the raw token, hex encoded
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
