//! `web_agent_snapshot` — build a state packet without executing an action.

use super::{validation_failure, Tool};
use crate::session::{SessionManager, SnapshotRequest};
use crate::validation;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct SnapshotTool {
    manager: Arc<SessionManager>,
}

impl SnapshotTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SnapshotTool {
    fn name(&self) -> &str {
        "web_agent_snapshot"
    }

    fn description(&self) -> &str {
        "Observe a session without acting. Include flags are honored \
         literally; anything not requested is omitted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string"},
                "include_dom": {"type": "boolean"},
                "include_ax": {"type": "boolean"},
                "include_network": {"type": "boolean"},
                "include_frames": {"type": "boolean"},
                "max_frames": {"type": "integer", "minimum": 1, "maximum": 64}
            },
            "required": ["session_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let report = validation::validate_snapshot(&args);
        if !report.ok {
            return Err(validation_failure(&report));
        }

        let session_id = args
            .get("session_id")
            .and_then(Value::as_str)
            .context("session_id is required")?
            .to_string();
        let session = self
            .manager
            .get(&session_id)
            .with_context(|| format!("unknown session id: {session_id}"))?;

        let request: SnapshotRequest = serde_json::from_value(args)?;
        let state = session.snapshot(request).await?;
        Ok(serde_json::to_value(state)?)
    }
}
