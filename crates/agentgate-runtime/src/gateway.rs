//! Central routing hub.
//!
//! The [`Gateway`] owns every live [`Connection`], an index from agent type to
//! the connections that declared it, and the table of requests waiting for a
//! response. It never looks inside a payload: requests are routed by
//! `target.type`, responses are correlated by request id, and events fan out
//! by type.
//!
//! Request ids are rewritten on the way out. Each forwarded request gets a
//! fresh gateway id so two workers can reuse the same id without colliding;
//! the origin's id is restored on the response.

use agentgate_core::{
    AgentId, AgentState, BroadcastEvent, ETag, Error, ErrorCode, Frame, Result, RpcError,
    RpcRequest, RpcResponse, StateStore, TypeRegistry,
};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId};
use crate::dispatch::{CloseReason, FrameHandler};
use crate::stats::{GatewayStats, StatsSnapshot};
use crate::transport::Transport;

/// Default pending-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default reaper tick.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5);

/// Gateway tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Age after which a pending request is failed with `REQUEST_TIMEOUT`.
    /// Zero disables expiry.
    pub request_timeout: Duration,
    /// How often the reaper scans the pending table.
    pub reap_interval: Duration,
    /// Reject agent types the registry does not know.
    pub strict_types: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            strict_types: false,
        }
    }
}

/// Where a request went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedRequest {
    /// Gateway-assigned request id seen by the target
    pub request_id: String,
    /// Connection the request was forwarded to
    pub target: ConnectionId,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    origin: ConnectionId,
    target: ConnectionId,
    original_id: String,
    target_agent: AgentId,
    created_at: Instant,
}

/// Connection table and type index. Guarded together so that removal on
/// close is atomic across both.
#[derive(Default)]
struct RoutingTable {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    by_type: HashMap<String, BTreeSet<ConnectionId>>,
}

impl RoutingTable {
    fn live(&self, agent_type: &str) -> Vec<Arc<Connection>> {
        self.by_type
            .get(agent_type)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id))
            .filter(|conn| conn.is_active())
            .cloned()
            .collect()
    }
}

/// The routing hub shared by every connection.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<TypeRegistry>,
    store: Arc<dyn StateStore>,
    routes: RwLock<RoutingTable>,
    cursors: DashMap<String, usize>,
    pending: DashMap<String, PendingRequest>,
    next_id: AtomicU64,
    stats: GatewayStats,
    cancel: CancellationToken,
}

impl Gateway {
    /// Create a gateway with its own root cancellation token.
    pub fn new(
        config: GatewayConfig,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn StateStore>,
    ) -> Arc<Self> {
        Self::with_cancellation(config, registry, store, CancellationToken::new())
    }

    /// Create a gateway whose connections are children of `cancel`.
    pub fn with_cancellation(
        config: GatewayConfig,
        registry: Arc<TypeRegistry>,
        store: Arc<dyn StateStore>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            store,
            routes: RwLock::new(RoutingTable::default()),
            cursors: DashMap::new(),
            pending: DashMap::new(),
            next_id: AtomicU64::new(0),
            stats: GatewayStats::default(),
            cancel,
        })
    }

    /// Wrap a transport, register it and start its pumps.
    ///
    /// # Errors
    ///
    /// Fails once the gateway is shutting down.
    pub async fn accept(self: &Arc<Self>, transport: Transport) -> Result<ConnectionId> {
        if self.cancel.is_cancelled() {
            return Err(Error::Internal("gateway is shutting down".to_string()));
        }

        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let conn = Arc::new(Connection::new(
            id,
            transport.peer().map(str::to_string),
            self.cancel.child_token(),
        ));

        self.routes
            .write()
            .await
            .connections
            .insert(id, Arc::clone(&conn));
        self.stats.connections_accepted.inc();
        info!(conn_id = %id, peer = ?conn.peer(), "Worker connection accepted");

        let handler: Arc<dyn FrameHandler> = Arc::clone(self) as Arc<dyn FrameHandler>;
        conn.start(transport, handler);
        Ok(id)
    }

    /// Declare that `conn` hosts `agent_type`.
    ///
    /// Returns `true` when the declaration is new; repeating it is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFrame`] for an empty type name
    /// - [`Error::UnknownAgentType`] in strict mode for unregistered types
    /// - [`Error::ConnectionNotFound`] if the connection is gone
    pub async fn add_supported_type(&self, conn: ConnectionId, agent_type: &str) -> Result<bool> {
        if agent_type.is_empty() {
            return Err(Error::invalid_frame("agent type must not be empty"));
        }
        if self.config.strict_types && self.registry.resolve(agent_type).is_none() {
            return Err(Error::UnknownAgentType(agent_type.to_string()));
        }

        let mut routes = self.routes.write().await;
        let connection = routes
            .connections
            .get(&conn)
            .filter(|c| c.is_active())
            .cloned()
            .ok_or_else(|| Error::ConnectionNotFound(conn.to_string()))?;

        let added = connection.add_supported_type(agent_type);
        routes
            .by_type
            .entry(agent_type.to_string())
            .or_default()
            .insert(conn);

        if added {
            self.stats.types_declared.inc();
            info!(conn_id = %conn, agent_type = %agent_type, "Agent type declared");
        }
        Ok(added)
    }

    /// Forward a request to one connection declaring `target.type`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnhandledMethod`] / [`Error::UnknownAgentType`] when the
    ///   registry rejects the call
    /// - [`Error::Unroutable`] when no live connection declares the type
    /// - [`Error::ConnectionNotFound`] when `origin` is gone
    /// - [`Error::ConnectionFault`] when the chosen target refused the frame
    pub async fn route_request(
        &self,
        origin: ConnectionId,
        mut request: RpcRequest,
    ) -> Result<RoutedRequest> {
        self.check_registry(&request)?;

        let agent_type = request.target.agent_type().to_string();
        let routes = self.routes.read().await;
        if !routes.connections.contains_key(&origin) {
            return Err(Error::ConnectionNotFound(origin.to_string()));
        }

        let candidates = routes.live(&agent_type);
        if candidates.is_empty() {
            self.stats.requests_unroutable.inc();
            debug!(conn_id = %origin, agent_type = %agent_type, "No connection for agent type");
            return Err(Error::Unroutable { agent_type });
        }
        let target = Arc::clone(&candidates[self.next_cursor(&agent_type, candidates.len())]);

        let request_id = Uuid::new_v4().to_string();
        let original_id = std::mem::replace(&mut request.request_id, request_id.clone());
        self.pending.insert(
            request_id.clone(),
            PendingRequest {
                origin,
                target: target.id(),
                original_id: original_id.clone(),
                target_agent: request.target.clone(),
                created_at: Instant::now(),
            },
        );

        if !target.send(Frame::Request(request)) {
            self.pending.remove(&request_id);
            return Err(Error::connection_fault(
                target.id(),
                "target connection is closed",
            ));
        }
        drop(routes);

        self.stats.requests_routed.inc();
        debug!(
            conn_id = %origin,
            target = %target.id(),
            request_id = %original_id,
            gateway_request_id = %request_id,
            "Request routed"
        );
        Ok(RoutedRequest {
            request_id,
            target: target.id(),
        })
    }

    /// Deliver a response to the connection that sent the request.
    ///
    /// Only the connection the request was forwarded to may answer it.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownResponse`] for ids with no pending entry (already
    ///   answered, expired, or never issued); the response is dropped
    /// - [`Error::ConnectionNotFound`] when the origin closed meanwhile
    pub async fn route_response(
        &self,
        responder: ConnectionId,
        mut response: RpcResponse,
    ) -> Result<ConnectionId> {
        let Some((_, pending)) = self
            .pending
            .remove_if(&response.request_id, |_, p| p.target == responder)
        else {
            self.stats.responses_dropped.inc();
            warn!(
                conn_id = %responder,
                request_id = %response.request_id,
                "Dropping response with no pending request"
            );
            return Err(Error::UnknownResponse(response.request_id));
        };

        let origin = self.connection(pending.origin).await;
        response.request_id = pending.original_id;

        match origin {
            Some(conn) if conn.send(Frame::Response(response)) => {
                self.stats.responses_routed.inc();
                debug!(conn_id = %responder, origin = %pending.origin, "Response routed");
                Ok(pending.origin)
            }
            _ => {
                self.stats.responses_dropped.inc();
                debug!(origin = %pending.origin, "Origin gone, response dropped");
                Err(Error::ConnectionNotFound(pending.origin.to_string()))
            }
        }
    }

    /// Fan an event out to every connection declaring its type, including the
    /// sender. Best effort; returns the number of deliveries.
    pub async fn route_event(&self, origin: ConnectionId, event: BroadcastEvent) -> usize {
        let targets = self.routes.read().await.live(&event.event_type);

        let delivered = targets
            .iter()
            .filter(|conn| conn.send(Frame::Event(event.clone())))
            .count();

        self.stats.events_published.inc();
        self.stats.event_deliveries.inc_by(delivered as u64);
        debug!(
            conn_id = %origin,
            event_type = %event.event_type,
            delivered,
            "Event published"
        );
        delivered
    }

    /// Forget a connection and everything derived from it. Idempotent.
    ///
    /// Requests it originated are dropped; requests it was serving are
    /// failed back to their origins with `TARGET_DISCONNECTED`. Returns
    /// `false` if the connection was already gone.
    pub async fn on_connection_closed(&self, id: ConnectionId) -> bool {
        let conn = {
            let mut routes = self.routes.write().await;
            let Some(conn) = routes.connections.remove(&id) else {
                return false;
            };
            routes.by_type.retain(|_, ids| {
                ids.remove(&id);
                !ids.is_empty()
            });
            self.cursors
                .retain(|agent_type, _| routes.by_type.contains_key(agent_type));
            conn
        };
        conn.cancel();

        let mut orphaned = 0u64;
        let mut failed = Vec::new();
        self.pending.retain(|_, pending| {
            if pending.origin == id {
                orphaned += 1;
                false
            } else if pending.target == id {
                failed.push(pending.clone());
                false
            } else {
                true
            }
        });
        self.stats.requests_orphaned.inc_by(orphaned);

        let failed_count = failed.len();
        self.fail_pending(
            failed,
            ErrorCode::TargetDisconnected,
            "target connection closed",
        )
        .await;

        self.stats.connections_closed.inc();
        info!(
            conn_id = %id,
            orphaned,
            failed = failed_count,
            "Worker connection removed"
        );
        true
    }

    /// Remove and close one connection.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let Some(conn) = self.connection(id).await else {
            return false;
        };
        let removed = self.on_connection_closed(id).await;
        conn.close().await;
        removed
    }

    /// Close every connection and stop accepting new ones.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let conns: Vec<Arc<Connection>> =
            self.routes.read().await.connections.values().cloned().collect();
        info!(connections = conns.len(), "Gateway shutting down");

        for conn in &conns {
            self.on_connection_closed(conn.id()).await;
        }
        join_all(conns.iter().map(|conn| conn.close())).await;
        self.pending.clear();
    }

    /// Fail every pending request older than the configured timeout.
    ///
    /// Returns the number of requests expired.
    pub async fn reap_expired(&self) -> usize {
        let timeout = self.config.request_timeout;
        if timeout.is_zero() {
            return 0;
        }

        let now = Instant::now();
        let mut expired = Vec::new();
        self.pending.retain(|_, pending| {
            if now.duration_since(pending.created_at) >= timeout {
                expired.push(pending.clone());
                false
            } else {
                true
            }
        });

        let count = expired.len();
        if count > 0 {
            self.stats.requests_expired.inc_by(count as u64);
            warn!(expired = count, "Pending requests timed out");
            self.fail_pending(expired, ErrorCode::RequestTimeout, "request timed out")
                .await;
        }
        count
    }

    /// Run [`reap_expired`](Self::reap_expired) on an interval until the
    /// gateway shuts down.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let interval = gateway.config.reap_interval;
            if gateway.config.request_timeout.is_zero() || interval.is_zero() {
                debug!("Pending request expiry disabled");
                return;
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = gateway.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        gateway.reap_expired().await;
                    }
                }
            }
            debug!("Pending request reaper stopped");
        })
    }

    /// Read an agent's state. Pass-through to the store.
    pub async fn read_state(&self, agent_id: &AgentId) -> Result<Option<AgentState>> {
        self.store.read(agent_id).await
    }

    /// Conditionally write an agent's state. Pass-through to the store.
    pub async fn write_state(&self, state: AgentState) -> Result<ETag> {
        self.store.write(state).await
    }

    /// Queue a frame for one connection. `false` if it is gone.
    pub async fn send_to(&self, id: ConnectionId, frame: Frame) -> bool {
        match self.connection(id).await {
            Some(conn) => conn.send(frame),
            None => false,
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Live connection count.
    pub async fn connection_count(&self) -> usize {
        self.routes.read().await.connections.len()
    }

    /// Requests waiting for a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Connections declaring `agent_type`, ascending.
    pub async fn connections_for_type(&self, agent_type: &str) -> Vec<ConnectionId> {
        self.routes
            .read()
            .await
            .by_type
            .get(agent_type)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Declared types of one connection.
    pub async fn supported_types(&self, id: ConnectionId) -> Option<HashSet<String>> {
        self.connection(id).await.map(|conn| conn.supported_types())
    }

    /// Type registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Name of the state backend.
    #[must_use]
    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    async fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.routes.read().await.connections.get(&id).cloned()
    }

    fn check_registry(&self, request: &RpcRequest) -> Result<()> {
        let agent_type = request.target.agent_type();
        match self.registry.resolve(agent_type) {
            Some(descriptor) if !descriptor.handles(&request.method) => {
                self.stats.requests_rejected.inc();
                Err(Error::UnhandledMethod {
                    agent_type: agent_type.to_string(),
                    method: request.method.clone(),
                })
            }
            None if self.config.strict_types => {
                self.stats.requests_rejected.inc();
                Err(Error::UnknownAgentType(agent_type.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn next_cursor(&self, agent_type: &str, len: usize) -> usize {
        let mut cursor = self.cursors.entry(agent_type.to_string()).or_insert(0);
        let index = *cursor % len;
        *cursor = (*cursor).wrapping_add(1);
        index
    }

    async fn fail_pending(&self, entries: Vec<PendingRequest>, code: ErrorCode, message: &str) {
        if entries.is_empty() {
            return;
        }
        let routes = self.routes.read().await;
        for pending in entries {
            let Some(origin) = routes.connections.get(&pending.origin) else {
                continue;
            };
            let error = RpcError::new(code, format!("{} ({})", message, pending.target_agent));
            origin.send(Frame::Response(RpcResponse::err(pending.original_id, error)));
        }
    }
}

#[async_trait]
impl FrameHandler for Gateway {
    async fn handle_frame(&self, origin: ConnectionId, frame: Frame) -> Result<()> {
        match frame {
            Frame::RegisterAgentType {
                request_id,
                agent_type,
            } => {
                let ack = match self.add_supported_type(origin, &agent_type).await {
                    Ok(_) => Frame::RegisterAgentTypeResponse {
                        request_id,
                        success: true,
                        error: None,
                    },
                    Err(e) => {
                        warn!(conn_id = %origin, agent_type = %agent_type, error = %e, "Agent type rejected");
                        Frame::RegisterAgentTypeResponse {
                            request_id,
                            success: false,
                            error: Some(RpcError::from(&e)),
                        }
                    }
                };
                self.send_to(origin, ack).await;
                Ok(())
            }
            Frame::Request(request) => {
                let request_id = request.request_id.clone();
                if let Err(e) = self.route_request(origin, request).await {
                    debug!(conn_id = %origin, request_id = %request_id, error = %e, "Request failed");
                    let reply = RpcResponse::err(request_id, RpcError::from(&e));
                    self.send_to(origin, Frame::Response(reply)).await;
                }
                Ok(())
            }
            Frame::Response(response) => match self.route_response(origin, response).await {
                // already counted and logged as a dropped response
                Ok(_) | Err(Error::UnknownResponse(_) | Error::ConnectionNotFound(_)) => Ok(()),
                Err(e) => Err(e),
            },
            Frame::Event(event) => {
                self.route_event(origin, event).await;
                Ok(())
            }
            Frame::RegisterAgentTypeResponse { .. } => Err(Error::invalid_frame(
                "register_agent_type_response is only sent by the gateway",
            )),
        }
    }

    async fn connection_lost(&self, id: ConnectionId, reason: CloseReason) {
        debug!(conn_id = %id, reason = %reason, "Removing lost connection");
        self.on_connection_closed(id).await;
    }

    fn dispatch_failed(&self, origin: ConnectionId, frame_kind: &'static str, error: &Error) {
        self.stats.dispatch_failures.inc();
        warn!(conn_id = %origin, frame = frame_kind, error = %error, "Frame dispatch failed");
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
