//! One worker connection.
//!
//! A [`Connection`] owns two tasks over its [`Transport`]:
//!
//! - the **read pump** pulls inbound frames and hands each one to the
//!   [`FrameHandler`] on a detached task, so a slow handler never stalls reads;
//! - the **write pump** is the single consumer of the unbounded outbound
//!   queue and the only place frames are written, in FIFO order.
//!
//! Cancellation is a normal exit and is not reported. Any other exit from
//! either pump (end of stream, I/O fault) cancels the connection and reports
//! it to the handler exactly once via [`FrameHandler::connection_lost`].

use agentgate_core::Frame;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::dispatch::{spawn_detached, CloseReason, FrameHandler};
use crate::transport::{FrameReader, FrameWriter, Transport};

/// How long the write pump waits for the sink to flush on shutdown.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection identifier, assigned at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live (or closing) worker connection.
pub struct Connection {
    id: ConnectionId,
    peer: Option<String>,
    connected_at: DateTime<Utc>,
    supported_types: RwLock<HashSet<String>>,
    outbound: mpsc::UnboundedSender<Frame>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    cancel: CancellationToken,
    started: AtomicBool,
    lost_reported: AtomicBool,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection that is not yet pumping.
    ///
    /// Frames sent before [`start`](Self::start) are queued.
    #[must_use]
    pub fn new(id: ConnectionId, peer: Option<String>, cancel: CancellationToken) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer,
            connected_at: Utc::now(),
            supported_types: RwLock::new(HashSet::new()),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            cancel,
            started: AtomicBool::new(false),
            lost_reported: AtomicBool::new(false),
            closed,
        }
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer label, if the transport carried one.
    #[must_use]
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Accept time.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// `true` until the connection is cancelled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Record that this connection hosts `agent_type`.
    ///
    /// Returns `true` when the type was newly added. A torn-down connection
    /// accepts nothing.
    pub fn add_supported_type(&self, agent_type: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        self.supported_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_type.to_string())
    }

    /// Whether `agent_type` has been declared.
    #[must_use]
    pub fn supports(&self, agent_type: &str) -> bool {
        self.supported_types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(agent_type)
    }

    /// Snapshot of the declared types.
    #[must_use]
    pub fn supported_types(&self) -> HashSet<String> {
        self.supported_types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queue a frame for the write pump. Never blocks.
    ///
    /// Returns `false` (and drops the frame) once the connection is torn down.
    pub fn send(&self, frame: Frame) -> bool {
        if !self.is_active() {
            debug!(conn_id = %self.id, frame = frame.kind(), "Dropping frame for closed connection");
            return false;
        }
        match self.outbound.send(frame) {
            Ok(()) => true,
            Err(mpsc::error::SendError(frame)) => {
                debug!(conn_id = %self.id, frame = frame.kind(), "Outbound queue closed, frame dropped");
                false
            }
        }
    }

    /// Spawn the read and write pumps.
    ///
    /// The returned handle resolves once both pumps have exited.
    pub fn start(
        self: &Arc<Self>,
        transport: Transport,
        handler: Arc<dyn FrameHandler>,
    ) -> JoinHandle<()> {
        let outbound_rx = self
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(outbound_rx) = outbound_rx else {
            warn!(conn_id = %self.id, "Connection already started");
            return self.spawn_wait_closed();
        };

        self.started.store(true, Ordering::SeqCst);
        if !self.is_active() {
            self.closed.send_replace(true);
            return tokio::spawn(async {});
        }

        let Transport { reader, writer, .. } = transport;
        let read = tokio::spawn(read_loop(Arc::clone(self), reader, Arc::clone(&handler)));
        let write = tokio::spawn(write_loop(Arc::clone(self), writer, outbound_rx, handler));

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = read.await {
                warn!(conn_id = %conn.id, error = %e, "Read pump panicked");
            }
            if let Err(e) = write.await {
                warn!(conn_id = %conn.id, error = %e, "Write pump panicked");
            }
            conn.closed.send_replace(true);
            debug!(conn_id = %conn.id, "Connection pumps stopped");
        })
    }

    /// Cancel both pumps without waiting for them.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel both pumps and wait for them to exit. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        if !self.started.load(Ordering::SeqCst) {
            self.closed.send_replace(true);
        }
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|done| *done).await;
    }

    fn spawn_wait_closed(self: &Arc<Self>) -> JoinHandle<()> {
        let mut closed = self.closed.subscribe();
        tokio::spawn(async move {
            let _ = closed.wait_for(|done| *done).await;
        })
    }

    async fn report_lost(&self, handler: &Arc<dyn FrameHandler>, reason: CloseReason) {
        if self.cancel.is_cancelled() || self.lost_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        info!(conn_id = %self.id, reason = %reason, "Connection lost");
        handler.connection_lost(self.id, reason).await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

async fn read_loop(conn: Arc<Connection>, mut reader: FrameReader, handler: Arc<dyn FrameHandler>) {
    let inflight = TaskTracker::new();
    let reason = loop {
        tokio::select! {
            biased;
            _ = conn.cancel.cancelled() => return,
            next = reader.next() => match next {
                Some(Ok(frame)) => {
                    debug!(conn_id = %conn.id, frame = frame.kind(), "Inbound frame");
                    spawn_detached(&inflight, Arc::clone(&handler), conn.id, frame);
                }
                Some(Err(e)) if !e.is_fatal() => {
                    warn!(conn_id = %conn.id, error = %e, "Invalid inbound frame");
                    conn.send(Frame::invalid(e.to_string()));
                }
                Some(Err(e)) => break CloseReason::Fault(e.to_string()),
                None => break CloseReason::StreamEnded,
            }
        }
    };

    // Frames read before the stream ended (e.g. a final response) must be
    // routed before this connection's pending requests are failed.
    inflight.close();
    inflight.wait().await;
    conn.report_lost(&handler, reason).await;
}

async fn write_loop(
    conn: Arc<Connection>,
    mut writer: FrameWriter,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    handler: Arc<dyn FrameHandler>,
) {
    let fault = loop {
        let frame = tokio::select! {
            biased;
            _ = conn.cancel.cancelled() => break None,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break None,
            },
        };

        let result = tokio::select! {
            biased;
            _ = conn.cancel.cancelled() => break None,
            result = writer.send(frame) => result,
        };

        if let Err(e) = result {
            break Some(CloseReason::Fault(e.to_string()));
        }
    };

    match fault {
        Some(reason) => conn.report_lost(&handler, reason).await,
        None => {
            let _ = tokio::time::timeout(WRITER_CLOSE_TIMEOUT, writer.close()).await;
        }
    }
}

#[cfg(test)]
mod tests;
