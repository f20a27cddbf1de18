//! `web_agent_session_create` — admit a session and return its initial
//! state packet.

use super::{validation_failure, Tool};
use crate::session::{CreateRequest, SessionManager};
use crate::validation;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct SessionCreateTool {
    manager: Arc<SessionManager>,
}

impl SessionCreateTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SessionCreateTool {
    fn name(&self) -> &str {
        "web_agent_session_create"
    }

    fn description(&self) -> &str {
        "Create a browser session, navigate to the target URL, and return the \
         session id, capabilities, and the initial state snapshot."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target_url": {
                    "type": "string",
                    "maxLength": 2048,
                    "description": "Page to open; http(s) only, subject to the host allow/deny lists"
                },
                "viewport": {
                    "type": "object",
                    "properties": {
                        "width": {"type": "integer", "minimum": 320, "maximum": 7680},
                        "height": {"type": "integer", "minimum": 200, "maximum": 4320}
                    }
                },
                "capture_profile": {
                    "type": "string",
                    "enum": ["adaptive", "dom_only", "frames_only"],
                    "description": "Which observations are included by default"
                },
                "policy": {
                    "type": "string",
                    "enum": ["model_owns_action", "deterministic"]
                },
                "max_steps": {"type": "integer", "minimum": 1, "maximum": 50000},
                "max_duration_ms": {"type": "integer", "minimum": 1000},
                "capture": {
                    "type": "object",
                    "properties": {
                        "max_frames": {"type": "integer", "minimum": 1, "maximum": 64}
                    }
                },
                "storage_state": {
                    "type": "string",
                    "description": "Path to a persisted browser profile directory"
                }
            },
            "required": ["target_url"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let config = self.manager.config();
        let report = validation::validate_create(&args, &config.allowlist, &config.denylist);
        if !report.ok {
            return Err(validation_failure(&report));
        }
        let request: CreateRequest = serde_json::from_value(args)?;
        let response = self.manager.create(request).await?;
        Ok(serde_json::to_value(response)?)
    }
}
