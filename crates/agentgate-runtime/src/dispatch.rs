//! Inbound frame dispatch.
//!
//! The read pump never awaits frame handling. Each frame goes to
//! [`spawn_detached`], which runs the handler on its own task; a failure is
//! reported to [`FrameHandler::dispatch_failed`] and nowhere else. The task
//! is registered on the pump's [`TaskTracker`] so the pump can let frames it
//! already read finish before reporting the connection lost.

use agentgate_core::{Error, Frame, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::warn;

use crate::connection::ConnectionId;

/// Why a connection stopped on its own (not through `close`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer ended the stream.
    StreamEnded,
    /// Read or write I/O failed.
    Fault(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamEnded => write!(f, "stream ended"),
            Self::Fault(msg) => write!(f, "fault: {}", msg),
        }
    }
}

/// Receiver of everything a connection's pumps produce.
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one inbound frame from `origin`.
    async fn handle_frame(&self, origin: ConnectionId, frame: Frame) -> Result<()>;

    /// The connection stopped because of end-of-stream or a fault.
    async fn connection_lost(&self, id: ConnectionId, reason: CloseReason);

    /// Error sink for detached dispatches.
    fn dispatch_failed(&self, origin: ConnectionId, frame_kind: &'static str, error: &Error) {
        warn!(conn_id = %origin, frame = frame_kind, error = %error, "Frame dispatch failed");
    }
}

/// Run `handler.handle_frame` on a detached task tracked by `tracker`.
///
/// Nobody awaits the returned handle in production; it is returned so tests
/// can.
pub fn spawn_detached(
    tracker: &TaskTracker,
    handler: Arc<dyn FrameHandler>,
    origin: ConnectionId,
    frame: Frame,
) -> JoinHandle<()> {
    tracker.spawn(async move {
        let kind = frame.kind();
        if let Err(e) = handler.handle_frame(origin, frame).await {
            handler.dispatch_failed(origin, kind, &e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        failures: Mutex<Vec<(ConnectionId, &'static str)>>,
    }

    #[async_trait]
    impl FrameHandler for RecordingHandler {
        async fn handle_frame(&self, _origin: ConnectionId, frame: Frame) -> Result<()> {
            match frame {
                Frame::RegisterAgentTypeResponse { .. } => {
                    Err(Error::invalid_frame("unexpected direction"))
                }
                _ => Ok(()),
            }
        }

        async fn connection_lost(&self, _id: ConnectionId, _reason: CloseReason) {}

        fn dispatch_failed(&self, origin: ConnectionId, frame_kind: &'static str, _error: &Error) {
            self.failures.lock().unwrap().push((origin, frame_kind));
        }
    }

    #[tokio::test]
    async fn test_failure_goes_to_sink() {
        let handler = Arc::new(RecordingHandler::default());
        let origin = ConnectionId::new(7);

        spawn_detached(
            &TaskTracker::new(),
            handler.clone(),
            origin,
            Frame::RegisterAgentTypeResponse {
                request_id: "1".into(),
                success: true,
                error: None,
            },
        )
        .await
        .unwrap();

        let failures = handler.failures.lock().unwrap().clone();
        assert_eq!(failures, vec![(origin, "register_agent_type_response")]);
    }

    #[tokio::test]
    async fn test_success_is_silent() {
        let handler = Arc::new(RecordingHandler::default());

        spawn_detached(
            &TaskTracker::new(),
            handler.clone(),
            ConnectionId::new(1),
            Frame::RegisterAgentType {
                request_id: "1".into(),
                agent_type: "Echo".into(),
            },
        )
        .await
        .unwrap();

        assert!(handler.failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tracker_waits_for_dispatch() {
        let handler = Arc::new(RecordingHandler::default());
        let tracker = TaskTracker::new();

        for _ in 0..3 {
            spawn_detached(
                &tracker,
                handler.clone(),
                ConnectionId::new(2),
                Frame::RegisterAgentTypeResponse {
                    request_id: "1".into(),
                    success: false,
                    error: None,
                },
            );
        }
        tracker.close();
        tracker.wait().await;

        assert_eq!(handler.failures.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::StreamEnded.to_string(), "stream ended");
        assert_eq!(
            CloseReason::Fault("reset".into()).to_string(),
            "fault: reset"
        );
    }
}
