//! Unary agent state calls.
//!
//! `GET /api/v1/state/{type}/{key}` returns the stored [`AgentState`], or an
//! empty 404 when nothing was ever written.
//! `PUT` performs a conditional write: the supplied etag must match the
//! stored one (or both be absent). A mismatch is a 409 and changes nothing.

use agentgate_core::protocol::base64_bytes;
use agentgate_core::{AgentId, AgentState, ETag, Error, RpcError};
use agentgate_runtime::Gateway;
use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Body of a state write
#[derive(Debug, Deserialize)]
pub struct WriteStateRequest {
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub etag: Option<ETag>,
}

/// Outcome of a state write
#[derive(Debug, Serialize)]
pub struct WriteStateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn error_response(status: StatusCode, err: &Error) -> Response {
    (
        status,
        Json(WriteStateResponse {
            success: false,
            etag: None,
            error: Some(RpcError::from(err)),
        }),
    )
        .into_response()
}

async fn read_state(
    Path((agent_type, key)): Path<(String, String)>,
    Extension(gateway): Extension<Arc<Gateway>>,
) -> Response {
    let agent_id = AgentId::new(agent_type, key);
    match gateway.read_state(&agent_id).await {
        Ok(Some(state)) => Json(state).into_response(),
        Ok(None) => {
            debug!(agent_id = %agent_id, "No stored state");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!(agent_id = %agent_id, error = %e, "State read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}

async fn write_state(
    Path((agent_type, key)): Path<(String, String)>,
    Extension(gateway): Extension<Arc<Gateway>>,
    Json(body): Json<WriteStateRequest>,
) -> Response {
    let mut state = AgentState::new(AgentId::new(agent_type, key), body.payload);
    state.etag = body.etag;
    let agent_id = state.agent_id.clone();

    match gateway.write_state(state).await {
        Ok(etag) => {
            debug!(agent_id = %agent_id, etag = %etag, "State written");
            Json(WriteStateResponse {
                success: true,
                etag: Some(etag),
                error: None,
            })
            .into_response()
        }
        Err(e @ Error::StaleWriteConflict { .. }) => {
            debug!(agent_id = %agent_id, error = %e, "Stale state write rejected");
            error_response(StatusCode::CONFLICT, &e)
        }
        Err(e) => {
            error!(agent_id = %agent_id, error = %e, "State write failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}

pub fn state_routes() -> Router {
    Router::new().route(
        "/api/v1/state/:agent_type/:key",
        get(read_state).put(write_state),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::{MemoryStateStore, TypeRegistry};
    use agentgate_runtime::GatewayConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let gateway = Gateway::new(
            GatewayConfig::default(),
            Arc::new(TypeRegistry::empty()),
            Arc::new(MemoryStateStore::new()),
        );
        state_routes().layer(Extension(gateway))
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn put_request(body: Value) -> Request<Body> {
        Request::put("/api/v1/state/Counter/c1")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request() -> Request<Body> {
        Request::get("/api/v1/state/Counter/c1")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_state_is_bare_404() {
        let response = app().oneshot(get_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_conditional_write_flow() {
        let app = app();

        // "MQ==" is base64 for "1"
        let (status, body) = call(&app, put_request(json!({ "payload": "MQ==" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let first = body["etag"].as_str().unwrap().to_string();

        let (status, body) = call(&app, get_request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent_id"]["type"], "Counter");
        assert_eq!(body["payload"], "MQ==");
        assert_eq!(body["etag"], first.as_str());

        let (status, body) = call(&app, put_request(json!({ "payload": "Mg==", "etag": "stale" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "STALE_WRITE_CONFLICT");

        let (_, body) = call(&app, get_request()).await;
        assert_eq!(body["payload"], "MQ==");

        let (status, body) = call(&app, put_request(json!({ "payload": "Mg==", "etag": first.as_str() }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["etag"].as_str().unwrap(), first);
    }

    #[tokio::test]
    async fn test_create_conflicts_when_state_exists() {
        let app = app();
        call(&app, put_request(json!({ "payload": "MQ==" }))).await;
        let (status, _) = call(&app, put_request(json!({ "payload": "Mg==" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
