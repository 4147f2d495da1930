//! Server configuration types

use agentgate_core::{AgentTypeDescriptor, MessageSchema, TypeRegistry};
use agentgate_runtime::GatewayConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl AppConfig {
    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest WebSocket message accepted from a worker
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8790
}
fn default_max_message_bytes() -> usize {
    4 * 1024 * 1024
}

/// Routing behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Pending request timeout in seconds (0 = never expire)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Reaper tick in seconds
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// Reject agent types missing from the registry
    #[serde(default)]
    pub strict_types: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            strict_types: false,
        }
    }
}

impl From<&GatewaySettings> for GatewayConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            reap_interval: Duration::from_secs(settings.reap_interval_secs),
            strict_types: settings.strict_types,
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_reap_interval_secs() -> u64 {
    5
}

/// State store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Memory,
    Sqlite,
}

/// State store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    /// Database file, used by the sqlite backend
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> String {
    "data/agent_state.db".to_string()
}

/// Startup agent type table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub types: Vec<AgentTypeDescriptor>,
    #[serde(default)]
    pub schemas: Vec<MessageSchema>,
}

impl RegistryConfig {
    /// Build the immutable registry.
    pub fn build(&self) -> Result<TypeRegistry> {
        TypeRegistry::builder()
            .agent_types(self.types.iter().cloned())
            .schemas(self.schemas.iter().cloned())
            .build()
            .context("Invalid [registry] configuration")
    }
}
