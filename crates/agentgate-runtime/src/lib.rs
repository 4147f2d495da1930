//! Agentgate Runtime - live side of the agent gateway
//!
//! - Transport: boxed frame reader/writer pairs, plus an in-memory duplex
//! - Connection: read and write pumps over one transport
//! - Dispatch: detached frame handling and the handler contract
//! - Gateway: connection table, type index, request correlation
//! - Shutdown: signal handling and drain sequencing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod dispatch;
pub mod gateway;
pub mod shutdown;
pub mod stats;
pub mod transport;

pub use connection::{Connection, ConnectionId};
pub use dispatch::{spawn_detached, CloseReason, FrameHandler};
pub use gateway::{Gateway, GatewayConfig, RoutedRequest};
pub use shutdown::{
    shutdown_signal_with_controller, wait_for_shutdown_signal, ShutdownController, ShutdownPhase,
};
pub use stats::{GatewayStats, StatsSnapshot};
pub use transport::{FrameReader, FrameWriter, Transport, TransportError, WorkerEnd};
