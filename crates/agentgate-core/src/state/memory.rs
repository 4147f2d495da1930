use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{AgentState, ETag, StateStore};
use crate::agent::AgentId;
use crate::error::{Error, Result};

/// In-memory state store (for development/testing).
///
/// Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<AgentId, (Vec<u8>, ETag)>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored agents.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read(&self, agent_id: &AgentId) -> Result<Option<AgentState>> {
        let entries = self.entries.read().await;
        Ok(entries.get(agent_id).map(|(payload, etag)| AgentState {
            agent_id: agent_id.clone(),
            payload: payload.clone(),
            etag: Some(etag.clone()),
        }))
    }

    async fn write(&self, state: AgentState) -> Result<ETag> {
        let mut entries = self.entries.write().await;
        let stored = entries.get(&state.agent_id).map(|(_, etag)| etag);

        if stored != state.etag.as_ref() {
            return Err(Error::StaleWriteConflict {
                actual: stored.map(|e| e.to_string()),
                expected: state.etag.map(|e| e.to_string()),
                agent_id: state.agent_id,
            });
        }

        let etag = ETag::next_after(stored);
        debug!(agent_id = %state.agent_id, etag = %etag, "State written");
        entries.insert(state.agent_id, (state.payload, etag.clone()));
        Ok(etag)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
