//! SQLite state storage backend
//!
//! Each agent's state is one row keyed by `(agent_type, agent_key)`. Writes
//! are single conditional statements, so the etag comparison and the update
//! happen atomically inside SQLite:
//!
//! - no expected etag: `INSERT ... ON CONFLICT DO NOTHING`
//! - expected etag: `UPDATE ... WHERE etag = ?`
//!
//! Zero affected rows means the writer lost the race.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{AgentState, ETag, StateStore};
use crate::agent::AgentId;
use crate::error::{Error, Result};

/// SQLite-backed state store
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (or create) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created or migrated.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::storage(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::storage(format!("Invalid SQLite path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::storage(format!("Failed to connect to SQLite: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;

        info!(path = %path.display(), "SQLite state store initialized");
        Ok(store)
    }

    /// Private in-memory database.
    ///
    /// The database lives exactly as long as the pool's single connection,
    /// so that connection is never idled out or recycled. Data is lost when
    /// the store is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened.
    pub async fn in_memory() -> Result<Self> {
        let pool = memory_pool_options()
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::storage(format!("Failed to open in-memory SQLite: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_state (
                agent_type TEXT NOT NULL,
                agent_key TEXT NOT NULL,
                payload BLOB NOT NULL,
                etag TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (agent_type, agent_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("Failed to create agent_state table: {}", e)))?;

        debug!("SQLite state schema initialized");
        Ok(())
    }

    async fn stored_etag(&self, agent_id: &AgentId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT etag FROM agent_state WHERE agent_type = ? AND agent_key = ?")
            .bind(agent_id.agent_type())
            .bind(agent_id.key())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("etag")))
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("Health check failed: {}", e)))?;
        Ok(true)
    }
}

/// Pool settings for `sqlite::memory:`: one connection that is kept open for
/// the life of the pool.
pub(super) fn memory_pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn read(&self, agent_id: &AgentId) -> Result<Option<AgentState>> {
        let row = sqlx::query(
            "SELECT payload, etag FROM agent_state WHERE agent_type = ? AND agent_key = ?",
        )
        .bind(agent_id.agent_type())
        .bind(agent_id.key())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AgentState {
            agent_id: agent_id.clone(),
            payload: row.get::<Vec<u8>, _>("payload"),
            etag: Some(ETag::new(row.get::<String, _>("etag"))),
        }))
    }

    async fn write(&self, state: AgentState) -> Result<ETag> {
        let new_etag = ETag::next_after(state.etag.as_ref());
        let now = Utc::now().to_rfc3339();

        let affected = match &state.etag {
            None => sqlx::query(
                r#"
                INSERT INTO agent_state (agent_type, agent_key, payload, etag, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(agent_type, agent_key) DO NOTHING
                "#,
            )
            .bind(state.agent_id.agent_type())
            .bind(state.agent_id.key())
            .bind(&state.payload)
            .bind(new_etag.as_str())
            .bind(&now)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            Some(expected) => sqlx::query(
                r#"
                UPDATE agent_state SET payload = ?, etag = ?, updated_at = ?
                WHERE agent_type = ? AND agent_key = ? AND etag = ?
                "#,
            )
            .bind(&state.payload)
            .bind(new_etag.as_str())
            .bind(&now)
            .bind(state.agent_id.agent_type())
            .bind(state.agent_id.key())
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected(),
        };

        if affected == 0 {
            let actual = self.stored_etag(&state.agent_id).await?;
            return Err(Error::StaleWriteConflict {
                agent_id: state.agent_id,
                expected: state.etag.map(|e| e.to_string()),
                actual,
            });
        }

        debug!(agent_id = %state.agent_id, etag = %new_etag, "State written");
        Ok(new_etag)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
