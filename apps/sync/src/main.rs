use axum::{extract::Extension, routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unison_sync::config::Config;
use unison_sync::routes::{health_router, HealthState};
use unison_sync::services::auth::{AuthConfig, AuthService};
use unison_sync::websocket::{ws_handler, ConnectionManager, PlaybackStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unison_sync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!(
        environment = %config.environment(),
        "Starting Unison sync server on port {}",
        config.port
    );

    // Playback-state store: Redis when reachable, in-memory otherwise
    let store = PlaybackStore::try_with_redis(
        &config.redis().connection_url(),
        config.playback_state_ttl_secs,
    )
    .await;
    if store.is_redis_backed() {
        tracing::info!("Playback state store is Redis-backed (multi-instance capable)");
    }

    // Per-user device registry and active-device pointers
    let manager = ConnectionManager::new();

    // Token verification for connection authentication
    let auth_service = AuthService::new(AuthConfig::with_expiry_string(
        config.jwt_secret.clone(),
        &config.jwt_access_expiry,
    ));
    tracing::info!("AuthService initialized");

    // Create health check state
    let health_state = HealthState::new(config.clone());

    // Build the router
    let app = Router::new()
        .route("/", get(root))
        // Sync transport: one persistent connection per client process
        .route("/ws", get(ws_handler))
        // Nested health routes: /health, /health/live, /health/ready
        .nest("/health", health_router(health_state))
        // Services as extensions for the WebSocket handler
        .layer(Extension(auth_service))
        .layer(Extension(manager))
        .layer(Extension(store))
        .layer(TraceLayer::new_for_http());

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Unison - Multi-device playback synchronization"
}
