//! HTTP API
//!
//! - Health and gateway statistics
//! - Unary agent state reads and conditional writes

pub mod health;
pub mod state;

use axum::Router;

pub use health::health_routes;
pub use state::state_routes;

/// All HTTP routes. Expects an `Extension<Arc<Gateway>>` layer.
pub fn api_router() -> Router {
    Router::new().merge(health_routes()).merge(state_routes())
}
