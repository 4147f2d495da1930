//! Agentgate Core - contracts shared by the gateway and its workers
//!
//! This crate provides the pieces of the agent runtime that do not depend on
//! a live connection:
//! - Agent: `(type, key)` addressing
//! - Registry: immutable agent type table built at startup
//! - Protocol: the `Frame` union carried on every worker stream
//! - State: optimistic-concurrency state store contract and backends
//! - Error: error taxonomy with wire codes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod state;

pub use agent::AgentId;
pub use error::{Error, Result};
pub use protocol::{BroadcastEvent, ErrorCode, Frame, RpcError, RpcRequest, RpcResponse};
pub use registry::{AgentTypeDescriptor, MessageSchema, TypeRegistry, TypeRegistryBuilder};
pub use state::{AgentState, ETag, MemoryStateStore, SqliteStateStore, StateStore};
