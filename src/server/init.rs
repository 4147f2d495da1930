//! Server initialization and main run loop

use super::config::AppConfig;
use super::init_stores::init_state_store;
use crate::websocket::agents::SocketLimits;
use agentgate_runtime::{shutdown_signal_with_controller, Gateway, GatewayConfig, ShutdownController};
use anyhow::{Context, Result};
use axum::{Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Everything the HTTP layer needs.
pub fn build_router(gateway: Arc<Gateway>, limits: SocketLimits) -> Router {
    Router::new()
        .merge(crate::api::api_router())
        .merge(crate::websocket::websocket_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(Extension(gateway))
                .layer(Extension(limits)),
        )
}

/// Run the server until a shutdown signal arrives
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Starting Agentgate v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(config.registry.build()?);
    info!(
        types = registry.len(),
        strict = config.gateway.strict_types,
        "Type registry loaded"
    );

    let store = init_state_store(&config.state).await?;

    let shutdown = ShutdownController::new();
    let gateway = Gateway::with_cancellation(
        GatewayConfig::from(&config.gateway),
        registry,
        store,
        shutdown.token(),
    );
    let reaper = gateway.spawn_reaper();

    let app = build_router(
        gateway.clone(),
        SocketLimits {
            max_message_bytes: config.server.max_message_bytes,
        },
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Agent gateway listening on ws://{}/ws/agents", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal_with_controller(shutdown.clone()))
    .await
    .context("HTTP server error")?;

    let drained = shutdown.drain(gateway.shutdown()).await;
    if !drained {
        warn!("Some worker connections did not close in time");
    }
    if let Err(e) = reaper.await {
        warn!("Reaper task error: {}", e);
    }

    info!("Agentgate shutdown complete");
    Ok(())
}
