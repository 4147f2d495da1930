//! Agent addressing.
//!
//! An [`AgentId`] names one logical agent instance as a `(type, key)` pair.
//! It is what callers use to address an agent, regardless of which worker
//! process currently hosts it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Logical agent address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId {
    /// Agent type name (routing key)
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Instance key within the type
    pub key: String,
}

impl AgentId {
    /// Create a new agent id.
    pub fn new(agent_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            agent_type: agent_type.into(),
            key: key.into(),
        }
    }

    /// Agent type name.
    #[must_use]
    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    /// Instance key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_type, self.key)
    }
}

impl FromStr for AgentId {
    type Err = Error;

    /// Parse the `type/key` form. The key may itself contain `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((agent_type, key)) if !agent_type.is_empty() && !key.is_empty() => {
                Ok(Self::new(agent_type, key))
            }
            _ => Err(Error::invalid_frame(format!(
                "agent id must be 'type/key', got '{}'",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = AgentId::new("Echo", "k1");
        assert_eq!(id.to_string(), "Echo/k1");

        let parsed: AgentId = "Echo/k1".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_key_with_slash() {
        let parsed: AgentId = "Planner/session/42".parse().unwrap();
        assert_eq!(parsed.agent_type(), "Planner");
        assert_eq!(parsed.key(), "session/42");
    }

    #[test]
    fn test_parse_rejects_incomplete() {
        assert!("Echo".parse::<AgentId>().is_err());
        assert!("/k1".parse::<AgentId>().is_err());
        assert!("Echo/".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_serde_uses_type_field() {
        let json = serde_json::to_string(&AgentId::new("Echo", "k1")).unwrap();
        assert_eq!(json, r#"{"type":"Echo","key":"k1"}"#);
    }
}
