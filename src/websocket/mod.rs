//! WebSocket module for Agentgate
//!
//! - /ws/agents - duplex frame stream for worker processes

pub mod agents;

pub use agents::agents_handler;

use axum::{routing::get, Router};

/// Create the WebSocket router
pub fn websocket_router() -> Router {
    Router::new().route("/ws/agents", get(agents_handler))
}
