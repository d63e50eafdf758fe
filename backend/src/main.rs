//! Ride-hailing backend server
//!
//! Serves the rider/captain HTTP API and the WebSocket notification gateway.

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use ridehail_server::auth::blacklist_purger;
use ridehail_server::config::Config;
use ridehail_server::db;
use ridehail_server::geocoding::{Geocoder, GoogleMapsGeocoder, OfflineGeocoder};
use ridehail_server::middleware::{self, RateLimiter};
use ridehail_server::routes;
use ridehail_server::state::AppState;
use ridehail_server::store::Persistence;

const BLACKLIST_PURGE_INTERVAL: Duration = Duration::from_secs(3600);
const RATE_LIMIT_JANITOR_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting ride-hailing server");

    let persistence = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database at {}", config.database_url_masked());
            let pool = db::create_pool(url, config.db_max_connections).await?;
            db::run_migrations(&pool).await?;
            Persistence::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is not persisted)");
            Persistence::memory()
        }
    };

    let geocoder: Arc<dyn Geocoder> = match &config.google_maps_api_key {
        Some(key) => Arc::new(
            GoogleMapsGeocoder::new(
                key.clone(),
                Duration::from_millis(config.geocoding_timeout_ms),
            )
            .context("Failed to build maps client")?,
        ),
        None => {
            tracing::warn!("GOOGLE_MAPS_API_KEY not set, using straight-line route estimates");
            Arc::new(OfflineGeocoder::new())
        }
    };

    let app_state = AppState::build(persistence, geocoder, &config)?;

    let purge_auth = app_state.auth_service.clone();
    let retention = chrono::Duration::hours(config.token_blacklist_retention_hours);
    tokio::spawn(async move {
        blacklist_purger(purge_auth, retention, BLACKLIST_PURGE_INTERVAL).await;
        tracing::error!("Blacklist purger exited unexpectedly");
    });

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    tokio::spawn(middleware::rate_limit_janitor(
        rate_limiter.clone(),
        RATE_LIMIT_JANITOR_INTERVAL,
    ));

    // Outermost first: CORS, rate limit, tracing
    let app = routes::api_router().with_state(app_state).layer(
        ServiceBuilder::new()
            .layer(configure_cors(config.cors_allowed_origins.as_deref()))
            .layer(axum::middleware::from_fn_with_state(
                rate_limiter,
                middleware::rate_limit,
            ))
            .layer(axum::middleware::from_fn(middleware::request_tracing)),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("WebSocket available at ws://{}/ws", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
