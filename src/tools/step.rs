//! `web_agent_step` — execute one action and return the post-action state.

use super::{validation_failure, Tool};
use crate::actions::ActionInput;
use crate::session::SessionManager;
use crate::validation;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct StepTool {
    manager: Arc<SessionManager>,
}

impl StepTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for StepTool {
    fn name(&self) -> &str {
        "web_agent_step"
    }

    fn description(&self) -> &str {
        "Execute exactly one action (navigate, click, hover, type, press, \
         scroll, drag, wait, wait_for) in a session and return the resulting \
         state packet plus the action outcome."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string"},
                "action": {
                    "type": "string",
                    "enum": ["navigate", "click", "hover", "type", "press",
                             "scroll", "drag", "wait", "wait_for"]
                },
                "selector": {"type": "string", "description": "CSS selector; preferred over coordinates"},
                "url": {"type": "string", "description": "Target for navigate"},
                "text": {"type": "string", "description": "Payload for type"},
                "key": {"type": "string", "description": "Key name for press"},
                "target": {"type": "string", "description": "wait_for target: networkidle, stable, or a selector"},
                "x": {"type": "number"},
                "y": {"type": "number"},
                "delta_x": {"type": "number"},
                "delta_y": {"type": "number"},
                "timeout_ms": {"type": "integer", "minimum": 50, "maximum": 120000},
                "max_actions_per_step": {"type": "integer", "minimum": 1, "maximum": 20},
                "capture": {
                    "type": "object",
                    "properties": {
                        "include_dom": {"type": "boolean"},
                        "include_ax": {"type": "boolean"},
                        "include_network": {"type": "boolean"},
                        "include_frames": {"type": "boolean"},
                        "max_frames": {"type": "integer", "minimum": 1, "maximum": 64}
                    }
                }
            },
            "required": ["session_id", "action"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let report = validation::validate_action(&args);
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
        self.manager.touch(&session_id);

        let input: ActionInput = serde_json::from_value(args)?;
        let result = session.step(input).await?;
        Ok(serde_json::to_value(result)?)
    }
}
