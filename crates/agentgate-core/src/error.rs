//! Error types for agentgate-core
//!
//! Every routing, state and transport failure the gateway can surface maps to
//! one variant here. Each variant has a stable wire code (see
//! [`ErrorCode`](crate::protocol::ErrorCode)) so that workers receive the same
//! classification the in-process caller does.

use thiserror::Error;

use crate::agent::AgentId;
use crate::protocol::ErrorCode;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Stream I/O failure on one connection
    #[error("connection fault on {connection}: {message}")]
    ConnectionFault {
        /// Connection label (e.g. `conn-3`)
        connection: String,
        /// Underlying transport message
        message: String,
    },

    /// No live connection declares the requested agent type
    #[error("no connection hosts agent type '{agent_type}'")]
    Unroutable {
        /// Requested agent type
        agent_type: String,
    },

    /// ETag mismatch on a state write
    #[error("stale write for {agent_id}: expected etag {expected:?}, stored {actual:?}")]
    StaleWriteConflict {
        /// Agent whose state was written
        agent_id: AgentId,
        /// ETag supplied by the writer
        expected: Option<String>,
        /// ETag currently stored
        actual: Option<String>,
    },

    /// A response arrived for a request id with no pending entry
    #[error("no pending request for response id '{0}'")]
    UnknownResponse(String),

    /// Agent type not present in the type registry
    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),

    /// Agent type resolved but does not handle the requested method
    #[error("agent type '{agent_type}' does not handle '{method}'")]
    UnhandledMethod {
        /// Target agent type
        agent_type: String,
        /// Requested method
        method: String,
    },

    /// Connection id not present in the gateway
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    /// Malformed inbound frame
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Type registry construction failed
    #[error("registry error: {0}")]
    Registry(String),

    /// State store backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a connection fault error
    #[must_use]
    pub fn connection_fault(connection: impl ToString, message: impl Into<String>) -> Self {
        Self::ConnectionFault {
            connection: connection.to_string(),
            message: message.into(),
        }
    }

    /// Create a storage error
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid frame error
    #[must_use]
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Wire code sent to workers for this error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConnectionFault { .. } => ErrorCode::TargetDisconnected,
            Self::Unroutable { .. } => ErrorCode::UnroutableRequest,
            Self::StaleWriteConflict { .. } => ErrorCode::StaleWriteConflict,
            Self::UnknownAgentType(_) => ErrorCode::UnknownAgentType,
            Self::UnhandledMethod { .. } => ErrorCode::UnhandledMethod,
            Self::InvalidFrame(_) | Self::Serialization(_) => ErrorCode::InvalidFrame,
            Self::UnknownResponse(_)
            | Self::ConnectionNotFound(_)
            | Self::Registry(_)
            | Self::Storage(_)
            | Self::Configuration(_)
            | Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the caller may reasonably retry.
    ///
    /// The gateway itself never retries; this only classifies.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unroutable { .. } | Self::StaleWriteConflict { .. } | Self::Storage(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::Unroutable {
            agent_type: "Echo".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::UnroutableRequest);

        let err = Error::StaleWriteConflict {
            agent_id: AgentId::new("Counter", "a"),
            expected: Some("1".to_string()),
            actual: Some("2".to_string()),
        };
        assert_eq!(err.code(), ErrorCode::StaleWriteConflict);
        assert_eq!(
            Error::UnknownAgentType("x".into()).code(),
            ErrorCode::UnknownAgentType
        );
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::Unroutable {
            agent_type: "Echo".into()
        }
        .is_retryable());
        assert!(!Error::invalid_frame("bad").is_retryable());
        assert!(!Error::UnknownResponse("r1".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection_fault("conn-1", "broken pipe");
        let msg = err.to_string();
        assert!(msg.contains("conn-1"));
        assert!(msg.contains("broken pipe"));
    }

    #[test]
    fn test_from_serde_error() {
        let result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        let err: Error = result.unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::InvalidFrame);
    }
}
