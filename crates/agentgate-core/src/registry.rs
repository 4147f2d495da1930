//! Agent type registry.
//!
//! Maps logical agent type names to descriptors: the message schemas the
//! deployment knows about and the set of named events (methods) each agent
//! type handles.
//!
//! ## Design
//!
//! - Built once at startup through [`TypeRegistryBuilder`], either from code or
//!   from configuration entries.
//! - Immutable after [`TypeRegistryBuilder::build`]; share it as
//!   `Arc<TypeRegistry>` and read it from any number of routing tasks without
//!   locking.
//! - There is no registration after startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};

/// Descriptor for one message type carried in payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSchema {
    /// Fully qualified message name (e.g. `agents.NewMessageReceived`)
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
}

impl MessageSchema {
    /// Create a schema entry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }
}

/// Descriptor for one agent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTypeDescriptor {
    /// Agent type name
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Event / method names this type handles. Empty means "accepts anything".
    #[serde(default)]
    pub handles: BTreeSet<String>,
}

impl AgentTypeDescriptor {
    /// Create a descriptor with no declared events.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            handles: BTreeSet::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a handled event.
    #[must_use]
    pub fn handling(mut self, event: impl Into<String>) -> Self {
        self.handles.insert(event.into());
        self
    }

    /// Whether this type handles `event`.
    #[must_use]
    pub fn handles(&self, event: &str) -> bool {
        self.handles.is_empty() || self.handles.contains(event)
    }
}

/// Immutable agent type registry.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, AgentTypeDescriptor>,
    schemas: HashMap<String, MessageSchema>,
}

impl TypeRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// An empty registry. Every type is unknown.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up an agent type descriptor.
    #[must_use]
    pub fn resolve(&self, type_name: &str) -> Option<&AgentTypeDescriptor> {
        self.types.get(type_name)
    }

    /// Whether `type_name` is registered and handles `event_name`.
    #[must_use]
    pub fn handles(&self, type_name: &str, event_name: &str) -> bool {
        self.resolve(type_name)
            .map(|d| d.handles(event_name))
            .unwrap_or(false)
    }

    /// Look up a message schema.
    #[must_use]
    pub fn schema(&self, message_name: &str) -> Option<&MessageSchema> {
        self.schemas.get(message_name)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered agent types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no agent types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Startup-time registration table for [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    types: Vec<AgentTypeDescriptor>,
    schemas: Vec<MessageSchema>,
}

impl TypeRegistryBuilder {
    /// Register an agent type.
    #[must_use]
    pub fn agent_type(mut self, descriptor: AgentTypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Register a message schema.
    #[must_use]
    pub fn schema(mut self, schema: MessageSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Register many agent types at once (e.g. from configuration).
    #[must_use]
    pub fn agent_types(mut self, descriptors: impl IntoIterator<Item = AgentTypeDescriptor>) -> Self {
        self.types.extend(descriptors);
        self
    }

    /// Register many schemas at once.
    #[must_use]
    pub fn schemas(mut self, schemas: impl IntoIterator<Item = MessageSchema>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    /// Freeze the table.
    ///
    /// # Errors
    ///
    /// Fails on empty or duplicate type/schema names.
    pub fn build(self) -> Result<TypeRegistry> {
        let mut types = HashMap::with_capacity(self.types.len());
        for descriptor in self.types {
            if descriptor.name.trim().is_empty() {
                return Err(Error::Registry("agent type name must not be empty".into()));
            }
            if types.contains_key(&descriptor.name) {
                return Err(Error::Registry(format!(
                    "agent type '{}' registered twice",
                    descriptor.name
                )));
            }
            types.insert(descriptor.name.clone(), descriptor);
        }

        let mut schemas = HashMap::with_capacity(self.schemas.len());
        for schema in self.schemas {
            if schema.name.trim().is_empty() {
                return Err(Error::Registry("schema name must not be empty".into()));
            }
            if schemas.contains_key(&schema.name) {
                return Err(Error::Registry(format!(
                    "schema '{}' registered twice",
                    schema.name
                )));
            }
            schemas.insert(schema.name.clone(), schema);
        }

        Ok(TypeRegistry { types, schemas })
    }
}

#[cfg(test)]
mod tests;
