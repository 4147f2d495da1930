//! State store selection

use super::config::{StateBackend, StateConfig};
use agentgate_core::{MemoryStateStore, SqliteStateStore, StateStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Open the configured state backend.
pub async fn init_state_store(config: &StateConfig) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.backend {
        StateBackend::Memory => Arc::new(MemoryStateStore::new()),
        StateBackend::Sqlite => {
            let store = SqliteStateStore::new(&config.sqlite_path)
                .await
                .with_context(|| format!("Failed to open state database {}", config.sqlite_path))?;
            Arc::new(store)
        }
    };

    info!(backend = store.backend_name(), "State store initialized");
    Ok(store)
}
