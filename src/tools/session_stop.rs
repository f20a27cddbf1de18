//! `web_agent_session_stop` — stop a session and clean or retain its trace.

use super::{validation_failure, Tool};
use crate::session::SessionManager;
use crate::validation;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct SessionStopTool {
    manager: Arc<SessionManager>,
}

impl SessionStopTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SessionStopTool {
    fn name(&self) -> &str {
        "web_agent_session_stop"
    }

    fn description(&self) -> &str {
        "Stop a session. With preserve=true the replay trace and frame \
         artifacts are retained; otherwise they are deleted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string"},
                "preserve": {
                    "type": "boolean",
                    "default": false,
                    "description": "Keep the replay trace on disk"
                }
            },
            "required": ["session_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let report = validation::validate_stop(&args);
        if !report.ok {
            return Err(validation_failure(&report));
        }

        let session_id = args
            .get("session_id")
            .and_then(Value::as_str)
            .context("session_id is required")?;
        let preserve = args
            .get("preserve")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let result = self.manager.stop(session_id, preserve).await;
        Ok(serde_json::to_value(result)?)
    }
}
