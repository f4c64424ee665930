//! Read-only HTTP API over the store, plus the notification stream

pub mod handlers;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::middleware;
use crate::service::RefreshService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RefreshService>,
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/points", get(handlers::points))
        .route("/api/stream", get(handlers::stream))
        .route("/api/snapshots/latest", get(handlers::latest_snapshot))
        .route("/api/snapshots/:date", get(handlers::snapshot_by_date))
        .nest_service("/json", ServeDir::new(&config.storage.json_dir))
        .with_state(state)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    config: &Config,
    service: Arc<RefreshService>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_router(AppState { service }, config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}
