//! Tool surface for the browser-control loop.
//!
//! Each tool implements the [`Tool`] trait defined in [`traits`]: a name, a
//! description, a JSON parameter schema, and an async `execute` returning a
//! JSON result map. Tools are assembled into a [`ToolRegistry`] which the
//! transports dispatch against.

pub mod replay;
pub mod session_create;
pub mod session_stop;
pub mod snapshot;
pub mod step;
pub mod traits;

pub use replay::ReplayTool;
pub use session_create::SessionCreateTool;
pub use session_stop::SessionStopTool;
pub use snapshot::SnapshotTool;
pub use step::StepTool;
pub use traits::{Tool, ToolSpec};

use crate::session::SessionManager;
use crate::validation::ValidationReport;
use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use std::sync::Arc;

/// Turn a failed validation report into the error surfaced to the caller.
pub(crate) fn validation_failure(report: &ValidationReport) -> anyhow::Error {
    anyhow!("validation failed: {}", report.codes().join(", "))
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The full tool surface bound to one session manager.
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            tools: vec![
                Box::new(SessionCreateTool::new(manager.clone())),
                Box::new(StepTool::new(manager.clone())),
                Box::new(SnapshotTool::new(manager.clone())),
                Box::new(SessionStopTool::new(manager.clone())),
                Box::new(ReplayTool::new(manager)),
            ],
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(AsRef::as_ref)
    }

    /// Dispatch one tool invocation.
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value> {
        let Some(tool) = self.find(name) else {
            bail!("Unknown tool: {name}");
        };
        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::mock::{MockDriver, MockPage};
    use crate::replay::ReplayStore;
    use serde_json::json;

    fn registry(tmp: &tempfile::TempDir) -> ToolRegistry {
        let config = Config {
            traces_root: tmp.path().join("traces"),
            ..Config::default()
        };
        let replay = Arc::new(ReplayStore::new(config.traces_root.clone()));
        let manager = SessionManager::new(
            config,
            Arc::new(MockDriver::with_page(Arc::new(MockPage::default()))),
            replay,
        );
        ToolRegistry::new(manager)
    }

    #[test]
    fn registry_exposes_the_five_tools() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        assert_eq!(
            registry.names(),
            vec![
                "web_agent_session_create",
                "web_agent_step",
                "web_agent_snapshot",
                "web_agent_session_stop",
                "web_agent_replay",
            ]
        );
    }

    #[test]
    fn every_tool_has_description_and_object_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        for spec in registry.specs() {
            assert!(!spec.description.is_empty(), "{} lacks description", spec.name);
            assert!(spec.parameters.is_object(), "{} schema not an object", spec.name);
            assert!(
                spec.parameters["properties"].is_object(),
                "{} schema has no properties",
                spec.name
            );
        }
    }

    #[tokio::test]
    async fn unknown_tool_errors_with_its_name() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        let err = registry.dispatch("web_agent_teleport", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: web_agent_teleport");
    }

    #[tokio::test]
    async fn create_then_step_then_stop_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);

        let created = registry
            .dispatch(
                "web_agent_session_create",
                json!({"target_url": "https://example.com/"}),
            )
            .await
            .unwrap();
        let session_id = created["session_id"].as_str().unwrap().to_string();
        let trace_id = created["trace_id"].as_str().unwrap().to_string();
        assert_eq!(created["initial_state_snapshot"]["change_tokens"][0], "INIT");

        let stepped = registry
            .dispatch(
                "web_agent_step",
                json!({
                    "session_id": session_id,
                    "action": "click",
                    "x": 5,
                    "y": 5,
                }),
            )
            .await
            .unwrap();
        assert_eq!(stepped["action_result"]["status"], "completed");
        assert_eq!(stepped["next_recommendation"], "continue");

        let snapshot = registry
            .dispatch(
                "web_agent_snapshot",
                json!({"session_id": session_id, "include_dom": true}),
            )
            .await
            .unwrap();
        assert!(snapshot["dom"].is_object());

        let stopped = registry
            .dispatch(
                "web_agent_session_stop",
                json!({"session_id": session_id, "preserve": true}),
            )
            .await
            .unwrap();
        assert_eq!(stopped["cleanup"], "retained");

        let replayed = registry
            .dispatch("web_agent_replay", json!({"trace_id": trace_id}))
            .await
            .unwrap();
        // create + step + snapshot + stop
        assert_eq!(replayed["total"], 4);
        assert_eq!(replayed["events"][0]["type"], "create");
        assert_eq!(replayed["events"][3]["type"], "stop");
    }

    #[tokio::test]
    async fn step_with_bad_args_reports_codes() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        let err = registry
            .dispatch(
                "web_agent_step",
                json!({"session_id": "s", "action": "type", "selector": "#q"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("MISSING_TEXT"));
    }

    #[tokio::test]
    async fn step_on_unknown_session_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        let err = registry
            .dispatch(
                "web_agent_step",
                json!({"session_id": "ghost", "action": "click", "x": 1, "y": 1}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown session id: ghost"));
    }

    #[tokio::test]
    async fn replay_range_filters_inclusively() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        let created = registry
            .dispatch(
                "web_agent_session_create",
                json!({"target_url": "https://example.com/"}),
            )
            .await
            .unwrap();
        let session_id = created["session_id"].as_str().unwrap();
        let trace_id = created["trace_id"].as_str().unwrap();

        for _ in 0..4 {
            registry
                .dispatch(
                    "web_agent_step",
                    json!({"session_id": session_id, "action": "click", "x": 1, "y": 1}),
                )
                .await
                .unwrap();
        }

        let replayed = registry
            .dispatch(
                "web_agent_replay",
                json!({"trace_id": trace_id, "start": 2, "end": 4}),
            )
            .await
            .unwrap();
        let indices: Vec<u64> = replayed["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["index"].as_u64().unwrap())
            .collect();
        assert_eq!(indices, vec![2, 3, 4]);
    }
}
