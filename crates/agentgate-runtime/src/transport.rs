//! Frame transport.
//!
//! A [`Transport`] is one physical duplex stream to a worker, reduced to a
//! boxed stream of inbound frames and a boxed sink of outbound frames. The
//! WebSocket endpoint adapts axum sockets into this shape; tests and
//! embedders use [`Transport::in_memory`].

use agentgate_core::Frame;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Underlying I/O failure. Fatal for the connection.
    #[error("i/o error: {0}")]
    Io(String),

    /// One inbound message could not be decoded. Not fatal.
    #[error("decode error: {0}")]
    Decode(String),

    /// The peer is gone.
    #[error("stream closed")]
    Closed,
}

impl TransportError {
    /// Whether the connection must be torn down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// Inbound half.
pub type FrameReader = BoxStream<'static, Result<Frame, TransportError>>;

/// Outbound half.
pub type FrameWriter = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// One duplex frame stream.
pub struct Transport {
    pub(crate) reader: FrameReader,
    pub(crate) writer: FrameWriter,
    pub(crate) peer: Option<String>,
}

impl Transport {
    /// Wrap a reader/writer pair.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
        W: Sink<Frame, Error = TransportError> + Send + 'static,
    {
        Self {
            reader: reader.boxed(),
            writer: Box::pin(writer),
            peer: None,
        }
    }

    /// Attach a peer label (e.g. the remote socket address).
    #[must_use]
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Peer label, if any.
    #[must_use]
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// In-process duplex: the gateway side and the worker side.
    #[must_use]
    pub fn in_memory() -> (Self, WorkerEnd) {
        let (to_gateway, from_worker) = mpsc::unbounded::<Result<Frame, TransportError>>();
        let (to_worker, from_gateway) = mpsc::unbounded::<Frame>();

        let transport = Self::new(
            from_worker,
            to_worker.sink_map_err(|_| TransportError::Closed),
        )
        .with_peer("in-memory");

        (
            transport,
            WorkerEnd {
                tx: to_gateway,
                rx: from_gateway,
            },
        )
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Worker side of an in-memory transport.
pub struct WorkerEnd {
    tx: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl WorkerEnd {
    /// Send a frame to the gateway. `false` if the gateway side is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.tx.unbounded_send(Ok(frame)).is_ok()
    }

    /// Inject a transport error into the gateway's read pump.
    pub fn inject_error(&self, error: TransportError) -> bool {
        self.tx.unbounded_send(Err(error)).is_ok()
    }

    /// Next frame from the gateway; `None` once the gateway closed its side.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.next().await
    }

    /// Like [`recv`](Self::recv) with a deadline.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.rx.next())
            .await
            .ok()
            .flatten()
    }

    /// Frame already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.next().now_or_never().flatten()
    }

    /// Declare an agent type and wait for the acknowledgement.
    ///
    /// Returns the acknowledgement frame. Meant for handshakes, before other
    /// traffic is flowing.
    pub async fn declare(&mut self, agent_type: &str) -> Option<Frame> {
        let request_id = format!("register-{}", agent_type);
        self.send(Frame::RegisterAgentType {
            request_id: request_id.clone(),
            agent_type: agent_type.to_string(),
        });

        while let Some(frame) = self.recv_timeout(Duration::from_secs(5)).await {
            if matches!(&frame, Frame::RegisterAgentTypeResponse { request_id: id, .. } if *id == request_id)
            {
                return Some(frame);
            }
        }
        None
    }

    /// End the worker's outbound stream (the gateway sees end-of-stream).
    pub fn close(&self) {
        self.tx.close_channel();
    }
}
