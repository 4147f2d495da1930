//! Agent gateway wire protocol.
//!
//! Every message on a worker's duplex stream is one [`Frame`]. Frames are
//! JSON, internally tagged by `"frame"`; opaque payloads travel as base64
//! strings. The gateway never looks inside a payload.
//!
//! | frame                         | direction         |
//! |-------------------------------|-------------------|
//! | `register_agent_type`         | worker → gateway  |
//! | `register_agent_type_response`| gateway → worker  |
//! | `request`                     | both              |
//! | `response`                    | both              |
//! | `event`                       | both              |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::agent::AgentId;
use crate::error::Error;

/// Wire frame carried on a worker connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    /// Handshake: the worker can host `agent_type`
    RegisterAgentType {
        /// Worker-chosen correlation id for the acknowledgement
        request_id: String,
        /// Agent type name
        agent_type: String,
    },
    /// Acknowledgement of a `register_agent_type` frame
    RegisterAgentTypeResponse {
        /// Echo of the registration request id
        request_id: String,
        /// Whether the type was accepted
        success: bool,
        /// Rejection reason
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
    /// Point-to-point request
    Request(RpcRequest),
    /// Response to a request
    Response(RpcResponse),
    /// Best-effort broadcast
    Event(BroadcastEvent),
}

impl Frame {
    /// Short frame kind for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegisterAgentType { .. } => "register_agent_type",
            Self::RegisterAgentTypeResponse { .. } => "register_agent_type_response",
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::Event(_) => "event",
        }
    }

    /// Error response for input that could not be parsed.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Response(RpcResponse::err(
            "",
            RpcError::new(ErrorCode::InvalidFrame, message),
        ))
    }

    /// Decode a frame from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrame`] when the text is not a valid frame.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::invalid_frame(e.to_string()))
    }

    /// Encode a frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Point-to-point request addressed to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id
    pub request_id: String,
    /// Calling agent, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AgentId>,
    /// Target agent
    pub target: AgentId,
    /// Method / event name
    pub method: String,
    /// Opaque payload
    #[serde(with = "base64_bytes", default)]
    pub payload: Vec<u8>,
    /// Free-form metadata, forwarded untouched
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl RpcRequest {
    /// Create a request.
    pub fn new(
        request_id: impl Into<String>,
        target: AgentId,
        method: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            source: None,
            target,
            method: method.into(),
            payload: payload.into(),
            metadata: HashMap::new(),
        }
    }

    /// Set the calling agent.
    #[must_use]
    pub fn with_source(mut self, source: AgentId) -> Self {
        self.source = Some(source);
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Response to an [`RpcRequest`]. `payload` and `error` are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Matches the request id
    pub request_id: String,
    /// Successful payload
    #[serde(
        with = "base64_bytes::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Vec<u8>>,
    /// Failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Free-form metadata, forwarded untouched
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl RpcResponse {
    /// Successful response.
    pub fn ok(request_id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id: request_id.into(),
            payload: Some(payload.into()),
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Error response.
    pub fn err(request_id: impl Into<String>, error: RpcError) -> Self {
        Self {
            request_id: request_id.into(),
            payload: None,
            error: Some(error),
            metadata: HashMap::new(),
        }
    }

    /// Whether this response carries an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Broadcast to every connection declaring `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    /// Agent type the event is delivered to
    #[serde(rename = "type")]
    pub event_type: String,
    /// Emitting agent
    pub source: AgentId,
    /// Opaque payload
    #[serde(with = "base64_bytes", default)]
    pub payload: Vec<u8>,
    /// Free-form metadata, forwarded untouched
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl BroadcastEvent {
    /// Create a broadcast event.
    pub fn new(
        event_type: impl Into<String>,
        source: AgentId,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            source,
            payload: payload.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Structured error carried in frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl RpcError {
    /// Create an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&Error> for RpcError {
    fn from(err: &Error) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Error codes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No connection hosts the target type
    UnroutableRequest,
    /// Declared type is not in the registry
    UnknownAgentType,
    /// Target type does not handle the method
    UnhandledMethod,
    /// Request expired before a response arrived
    RequestTimeout,
    /// Connection serving the request went away
    TargetDisconnected,
    /// Malformed frame
    InvalidFrame,
    /// ETag mismatch on a state write
    StaleWriteConflict,
    /// Anything else
    InternalError,
}

/// Serde helpers encoding `Vec<u8>` as standard base64.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as base64.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize bytes from base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    /// Same encoding for `Option<Vec<u8>>`.
    pub mod option {
        use super::STANDARD;
        use base64::Engine as _;
        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize optional bytes as base64.
        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize optional bytes from base64.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded: Option<String> = Option::deserialize(deserializer)?;
            encoded
                .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
