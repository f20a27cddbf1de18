//! Session pool: admission control and lifecycle bookkeeping for a bounded
//! set of browser sessions within one process.

pub mod browser_session;
pub mod netlog;
pub mod policy;


pub use browser_session::{
    BrowserSession, SessionCapabilities, SessionSettings, SnapshotRequest, StartOutcome,
    StepResult, StopResult,
};

use crate::capture::{resolve_frame_cap, FrameRef};
use crate::config::{Config, PolicyMode};
use crate::driver::{BrowserDriver, Viewport};
use crate::metrics;
use crate::replay::ReplayStore;
use crate::state::{CaptureRequest, StatePacket};
use crate::util;
use crate::validation;
use anyhow::{bail, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Garbage-collection sweep interval.
const GC_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_MAX_STEPS: u64 = 500;
const DEFAULT_MAX_DURATION_MS: u64 = 15 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureProfile {
    Adaptive,
    DomOnly,
    FramesOnly,
}

impl CaptureProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adaptive => "adaptive",
            Self::DomOnly => "dom_only",
            Self::FramesOnly => "frames_only",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "adaptive" => Some(Self::Adaptive),
            "dom_only" => Some(Self::DomOnly),
            "frames_only" => Some(Self::FramesOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub capture_profile: Option<String>,
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub max_steps: Option<u64>,
    #[serde(default)]
    pub max_duration_ms: Option<u64>,
    #[serde(default)]
    pub capture: Option<CaptureRequest>,
    #[serde(default)]
    pub storage_state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub session_id: String,
    pub trace_id: String,
    pub session_capabilities: SessionCapabilities,
    pub initial_state_snapshot: StatePacket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_ref: Option<FrameRef>,
}

pub struct SessionManager {
    config: Config,
    driver: Arc<dyn BrowserDriver>,
    replay: Arc<ReplayStore>,
    sessions: Mutex<HashMap<String, Arc<BrowserSession>>>,
}

impl SessionManager {
    pub fn new(config: Config, driver: Arc<dyn BrowserDriver>, replay: Arc<ReplayStore>) -> Arc<Self> {
        Arc::new(Self {
            config,
            driver,
            replay,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn replay_store(&self) -> Arc<ReplayStore> {
        self.replay.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Admit a new session, evicting the oldest one when the pool is full.
    pub async fn create(&self, request: CreateRequest) -> Result<CreateResponse> {
        let report = validation::validate_url(
            &request.target_url,
            &self.config.allowlist,
            &self.config.denylist,
        );
        if !report.ok {
            bail!("url validation failed: {}", report.codes().join(", "));
        }

        while self.session_count() >= self.config.max_sessions.max(1) {
            self.evict_oldest().await;
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let created_epoch = util::now_ms();
        let trace_id = format!("{session_id}-{created_epoch}");

        let profile = request
            .capture_profile
            .as_deref()
            .and_then(CaptureProfile::parse)
            .unwrap_or(CaptureProfile::Adaptive);

        let policy_mode = match request.policy.as_deref() {
            Some("deterministic") => PolicyMode::Deterministic,
            Some("model_owns_action") => PolicyMode::ModelOwnsAction,
            _ => self.config.policy_mode,
        };

        let frame_cap = resolve_frame_cap(
            request.capture.and_then(|c| c.max_frames),
            profile == CaptureProfile::FramesOnly,
        );

        let settings = SessionSettings {
            target_url: request.target_url.clone(),
            viewport: request.viewport,
            profile,
            policy: policy::policy_for(policy_mode),
            max_steps: request.max_steps.filter(|&n| n > 0).unwrap_or(DEFAULT_MAX_STEPS),
            max_duration_ms: request
                .max_duration_ms
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_DURATION_MS),
            frame_cap,
            headless: self.config.headless,
            storage_state: request.storage_state.map(std::path::PathBuf::from),
        };

        let session = BrowserSession::new(
            session_id.clone(),
            trace_id.clone(),
            settings,
            self.replay.clone(),
        );
        let outcome = session.start(self.driver.as_ref()).await?;

        self.sessions.lock().insert(session_id.clone(), session);
        metrics::global().record_session_created();
        info!(session = %session_id, count = self.session_count(), "session admitted");

        Ok(CreateResponse {
            session_id,
            trace_id,
            session_capabilities: outcome.capabilities,
            initial_state_snapshot: outcome.initial_state,
            frame_ref: outcome.frame_ref,
        })
    }

    pub fn get(&self, id: &str) -> Option<Arc<BrowserSession>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Refresh a session's activity timestamp.
    pub fn touch(&self, id: &str) {
        if let Some(session) = self.get(id) {
            session.touch();
        }
    }

    /// Stop a session and forget it. Unknown ids are a no-op.
    pub async fn stop(&self, id: &str, preserve: bool) -> StopResult {
        let session = self.sessions.lock().remove(id);
        match session {
            Some(session) => session.stop(preserve).await,
            None => StopResult {
                status: "unknown".to_string(),
                cleanup: "noop".to_string(),
                trace_path: String::new(),
            },
        }
    }

    /// Stop every session older than the configured max age. Per-session
    /// stop failures are swallowed so the sweep always completes.
    pub async fn gc(&self) -> usize {
        let now = util::now_ms();
        let expired: Vec<Arc<BrowserSession>> = {
            let sessions = self.sessions.lock();
            sessions
                .values()
                .filter(|s| now.saturating_sub(s.created_at_ms()) > self.config.session_max_age_ms)
                .cloned()
                .collect()
        };

        let mut evicted = 0;
        for session in expired {
            let id = session.id().to_string();
            self.sessions.lock().remove(&id);
            session.stop(false).await;
            metrics::global().record_session_evicted();
            evicted += 1;
            warn!(session = %id, "session garbage-collected");
        }
        evicted
    }

    async fn evict_oldest(&self) {
        let oldest = {
            let sessions = self.sessions.lock();
            sessions
                .values()
                .min_by_key(|s| s.created_at_ms())
                .cloned()
        };
        if let Some(session) = oldest {
            let id = session.id().to_string();
            self.sessions.lock().remove(&id);
            session.stop(false).await;
            metrics::global().record_session_evicted();
            warn!(session = %id, "oldest session evicted for admission");
        }
    }

    /// Periodic GC tick; runs until the task is aborted.
    pub fn spawn_gc_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(GC_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = manager.gc().await;
                if evicted > 0 {
                    info!(evicted, "gc sweep finished");
                }
            }
        })
    }
}
