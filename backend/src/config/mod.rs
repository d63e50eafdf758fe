//! Configuration management for the ride-hailing backend
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::models::VehicleType;
use crate::ride::fare::RateCard;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Rate limit: requests per second per IP
    pub rate_limit_rps: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// JWT secret for token signing
    pub jwt_secret: String,

    /// Access token TTL in seconds (default: 86400 = 24 hours)
    pub jwt_ttl_seconds: i64,

    /// How long revoked token hashes are kept before purging
    pub token_blacklist_retention_hours: i64,

    pub bcrypt_cost: u32,

    /// Google Maps key; offline distance estimates are used when absent
    pub google_maps_api_key: Option<String>,

    pub geocoding_timeout_ms: u64,
    pub push_timeout_ms: u64,

    pub dispatch_radius_meters: f64,
    pub dispatch_max_candidates: usize,
    pub otp_ttl_minutes: i64,
    pub estimated_arrival_minutes: i64,
    pub max_active_rides: u32,

    pub surge_multiplier: f64,
    pub minimum_fare: f64,
    pub fare_currency: String,
    pub fare_rates: Vec<(VehicleType, RateCard)>,

    /// Notifications kept per party before the oldest are dropped
    pub notification_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            port: 3001,
            database_url: None,
            db_max_connections: 5,
            rate_limit_rps: 100,
            cors_allowed_origins: None,
            log_level: "info".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_ttl_seconds: 86_400,
            token_blacklist_retention_hours: 24,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            google_maps_api_key: None,
            geocoding_timeout_ms: 5_000,
            push_timeout_ms: 250,
            dispatch_radius_meters: 5_000.0,
            dispatch_max_candidates: 10,
            otp_ttl_minutes: 10,
            estimated_arrival_minutes: 15,
            max_active_rides: 1,
            surge_multiplier: 1.0,
            minimum_fare: 0.0,
            fare_currency: "INR".to_string(),
            fare_rates: VehicleType::ALL
                .iter()
                .map(|vehicle| (*vehicle, RateCard::default_for(*vehicle)))
                .collect(),
            notification_retention: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::from_str(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| defaults.port.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
            }
            Err(_) => defaults.jwt_secret.clone(),
        };

        let surge_multiplier = env_or("SURGE_MULTIPLIER", defaults.surge_multiplier);
        if !(surge_multiplier >= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "SURGE_MULTIPLIER must be at least 1.0, got {}",
                surge_multiplier
            )));
        }

        let mut fare_rates = Vec::with_capacity(VehicleType::ALL.len());
        for vehicle in VehicleType::ALL {
            let key = format!("FARE_RATES_{}", vehicle.as_str());
            let card = match env::var(&key) {
                Ok(raw) => parse_rate_card(&raw).map_err(|e| {
                    ConfigError::InvalidValue(format!("{}: {}", key, e))
                })?,
                Err(_) => RateCard::default_for(vehicle),
            };
            fare_rates.push((vehicle, card));
        }

        let jwt_ttl_seconds = env_or("JWT_TTL_SECONDS", defaults.jwt_ttl_seconds);

        // A revoked token must stay blacklisted at least as long as it could still verify.
        let token_blacklist_retention_hours = env_or(
            "TOKEN_BLACKLIST_RETENTION_HOURS",
            defaults.token_blacklist_retention_hours,
        )
        .max((jwt_ttl_seconds + 3_599) / 3_600);

        Ok(Config {
            environment,
            port,
            database_url: non_empty_var("DATABASE_URL"),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", defaults.db_max_connections),
            rate_limit_rps: env_or("RATE_LIMIT_RPS", defaults.rate_limit_rps),
            cors_allowed_origins: non_empty_var("CORS_ALLOWED_ORIGINS"),
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            jwt_secret,
            jwt_ttl_seconds,
            token_blacklist_retention_hours,
            bcrypt_cost: env_or("BCRYPT_COST", defaults.bcrypt_cost),
            google_maps_api_key: non_empty_var("GOOGLE_MAPS_API_KEY"),
            geocoding_timeout_ms: env_or("GEOCODING_TIMEOUT_MS", defaults.geocoding_timeout_ms),
            push_timeout_ms: env_or("PUSH_TIMEOUT_MS", defaults.push_timeout_ms),
            dispatch_radius_meters: env_or(
                "DISPATCH_RADIUS_METERS",
                defaults.dispatch_radius_meters,
            ),
            dispatch_max_candidates: env_or(
                "DISPATCH_MAX_CANDIDATES",
                defaults.dispatch_max_candidates,
            ),
            otp_ttl_minutes: env_or("OTP_TTL_MINUTES", defaults.otp_ttl_minutes),
            estimated_arrival_minutes: env_or(
                "ESTIMATED_ARRIVAL_MINUTES",
                defaults.estimated_arrival_minutes,
            ),
            max_active_rides: env_or("MAX_ACTIVE_RIDES", defaults.max_active_rides).max(1),
            surge_multiplier,
            minimum_fare: env_or("MINIMUM_FARE", defaults.minimum_fare),
            fare_currency: env::var("FARE_CURRENCY").unwrap_or(defaults.fare_currency),
            fare_rates,
            notification_retention: env_or(
                "NOTIFICATION_RETENTION",
                defaults.notification_retention,
            )
            .max(1),
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        let Some(url) = self.database_url.as_deref() else {
            return "<in-memory>".to_string();
        };
        // Mask password in database URL for logging
        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        url.to_string()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse a `base:per_km:per_min` rate triple.
pub fn parse_rate_card(raw: &str) -> Result<RateCard, ConfigError> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(ConfigError::InvalidValue(format!(
            "expected base:per_km:per_min, got '{}'",
            raw
        )));
    }

    let mut values = [0.0_f64; 3];
    for (slot, part) in values.iter_mut().zip(parts) {
        let value = part
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidValue(format!("'{}' is not a number", part)))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "'{}' must be a non-negative number",
                part
            )));
        }
        *slot = value;
    }

    Ok(RateCard {
        base: values[0],
        per_km: values[1],
        per_minute: values[2],
    })
}
