//! Core trait for agent-callable tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializable description of a tool for transport handshakes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool exposed over the serialization boundary. Implementations must be
/// `Send + Sync` as tools are shared across transport tasks.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. `web_agent_step`).
    fn name(&self) -> &str;

    /// Human-readable description surfaced to callers.
    fn description(&self) -> &str;

    /// JSON schema for the tool parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute with JSON arguments, returning a JSON result map.
    async fn execute(&self, args: Value) -> anyhow::Result<Value>;

    /// Full specification for discovery.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
