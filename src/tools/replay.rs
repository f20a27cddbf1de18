//! `web_agent_replay` — reconstruct the recorded event sequence of a trace.

use super::{validation_failure, Tool};
use crate::session::SessionManager;
use crate::validation;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ReplayTool {
    manager: Arc<SessionManager>,
}

impl ReplayTool {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ReplayTool {
    fn name(&self) -> &str {
        "web_agent_replay"
    }

    fn description(&self) -> &str {
        "Load the replay events of a trace, optionally restricted to an \
         inclusive index range. Replay is audit-reconstruction, not \
         re-execution."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "trace_id": {"type": "string"},
                "start": {"type": "integer", "minimum": 1},
                "end": {"type": "integer", "minimum": 1}
            },
            "required": ["trace_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let report = validation::validate_replay(&args);
        if !report.ok {
            return Err(validation_failure(&report));
        }

        let trace_id = args
            .get("trace_id")
            .and_then(Value::as_str)
            .context("trace_id is required")?;
        let start = args.get("start").and_then(Value::as_u64);
        let end = args.get("end").and_then(Value::as_u64);

        let store = self.manager.replay_store();
        let manifest = store.load(trace_id)?;
        let events = store.filter(trace_id, start, end)?;

        Ok(json!({
            "trace_id": manifest.trace_id,
            "created_at": manifest.created_at,
            "session_id": manifest.session_id,
            "total": events.len(),
            "events": events,
        }))
    }
}
