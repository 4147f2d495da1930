//! Agent state storage.
//!
//! State is an opaque blob per [`AgentId`] guarded by an [`ETag`]. Writers
//! supply the ETag they last read; the store rejects the write with
//! [`Error::StaleWriteConflict`](crate::Error::StaleWriteConflict) when it no
//! longer matches, so concurrent writers detect the race instead of silently
//! overwriting each other.
//!
//! Backends:
//! - [`MemoryStateStore`]: process-local, lost on restart
//! - [`SqliteStateStore`]: persistent, conditional `UPDATE` on the etag column

mod memory;
mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::agent::AgentId;
use crate::error::Result;
use crate::protocol::base64_bytes;

/// Opaque optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Wrap an existing token.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Fresh token guaranteed to differ from `previous`.
    #[must_use]
    pub fn next_after(previous: Option<&ETag>) -> Self {
        loop {
            let candidate = Self::generate();
            if previous != Some(&candidate) {
                return candidate;
            }
        }
    }

    /// Token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted state of one agent.
///
/// On reads `etag` is the stored token. On writes it is the token the writer
/// expects to replace (`None` = "create, must not exist yet").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Owning agent
    pub agent_id: AgentId,
    /// Opaque payload
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Concurrency token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
}

impl AgentState {
    /// State for a first write (no etag).
    pub fn new(agent_id: AgentId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            agent_id,
            payload: payload.into(),
            etag: None,
        }
    }

    /// Set the expected etag.
    #[must_use]
    pub fn with_etag(mut self, etag: ETag) -> Self {
        self.etag = Some(etag);
        self
    }
}

/// Store for agent state blobs with optimistic concurrency.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the current state, `None` if nothing was ever written.
    async fn read(&self, agent_id: &AgentId) -> Result<Option<AgentState>>;

    /// Conditionally write `state`, returning the new etag.
    ///
    /// Succeeds when `state.etag` equals the stored etag, or when nothing is
    /// stored and `state.etag` is `None`. Otherwise fails with
    /// `StaleWriteConflict` and leaves the stored payload untouched.
    async fn write(&self, state: AgentState) -> Result<ETag>;

    /// Backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}
