//! Health and gateway statistics endpoints.
//!
//! - `/health`: liveness for load balancers
//! - `/api/v1/gateway/stats`: routing counters plus live table sizes

use agentgate_runtime::{Gateway, StatsSnapshot};
use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::Arc;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Gateway statistics
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: usize,
    pub pending_requests: usize,
    pub registered_types: Vec<String>,
    pub state_backend: &'static str,
    #[serde(flatten)]
    pub counters: StatsSnapshot,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn gateway_stats(Extension(gateway): Extension<Arc<Gateway>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: gateway.connection_count().await,
        pending_requests: gateway.pending_count(),
        registered_types: gateway
            .registry()
            .type_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        state_backend: gateway.store_backend(),
        counters: gateway.stats(),
    })
}

pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/gateway/stats", get(gateway_stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::{AgentTypeDescriptor, MemoryStateStore, TypeRegistry};
    use agentgate_runtime::GatewayConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let registry = TypeRegistry::builder()
            .agent_type(AgentTypeDescriptor::new("Echo"))
            .build()
            .unwrap();
        let gateway = Gateway::new(
            GatewayConfig::default(),
            Arc::new(registry),
            Arc::new(MemoryStateStore::new()),
        );
        health_routes().layer(Extension(gateway))
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_stats() {
        let (status, body) = get_json("/api/v1/gateway/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connections"], 0);
        assert_eq!(body["pending_requests"], 0);
        assert_eq!(body["registered_types"], serde_json::json!(["Echo"]));
        assert_eq!(body["state_backend"], "memory");
        assert_eq!(body["requests_routed"], 0);
    }
}
