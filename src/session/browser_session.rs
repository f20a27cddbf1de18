//! Per-session state machine binding page, capture, state, actions, and
//! replay.
//!
//! Lifecycle: `Created → Starting → Active → Stopping → Stopped`. A stopped
//! session is never reactivated. Callers serialize operations on one
//! session; distinct sessions run concurrently.

use super::netlog::{NetworkEvent, NetworkLog, NETWORK_LOG_CAP};
use super::policy::ActionPolicy;
use super::CaptureProfile;
use crate::actions::{ActionExecutor, ActionInput, ActionResult};
use crate::capture::{CaptureConfig, CaptureCoordinator, FrameRef, QueueHealth};
use crate::driver::{BrowserDriver, BrowserHandle, DriverPage, LaunchOptions, Viewport};
use crate::metrics;
use crate::replay::{ReplayEvent, ReplayStore};
use crate::state::{CaptureRequest, CaptureSettings, StateBuilder, StatePacket};
use crate::util;
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Navigation deadline for the initial page load.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(120);
const SCREENCAST_QUALITY: u32 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Created,
    Starting,
    Active,
    Stopping,
    Stopped,
}

/// Everything the manager resolved before constructing the session.
pub struct SessionSettings {
    pub target_url: String,
    pub viewport: Option<Viewport>,
    pub profile: CaptureProfile,
    pub policy: Arc<dyn ActionPolicy>,
    pub max_steps: u64,
    pub max_duration_ms: u64,
    pub frame_cap: usize,
    pub headless: bool,
    pub storage_state: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCapabilities {
    pub capture_profile: String,
    pub max_steps: u64,
    pub max_duration_ms: u64,
    pub policy: String,
    pub dom_first: bool,
    pub frame_capture: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub state: StatePacket,
    pub frame_refs: Vec<FrameRef>,
    pub action_result: ActionResult,
    pub error_codes: Vec<String>,
    pub next_recommendation: String,
    pub latency_ms: u64,
    pub queue_health: QueueHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResult {
    pub status: String,
    pub cleanup: String,
    #[serde(rename = "tracePath")]
    pub trace_path: String,
}

/// Literal include flags for a snapshot request; absent means excluded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SnapshotRequest {
    #[serde(default)]
    pub include_dom: bool,
    #[serde(default)]
    pub include_ax: bool,
    #[serde(default)]
    pub include_network: bool,
    #[serde(default)]
    pub include_frames: bool,
    #[serde(default)]
    pub max_frames: Option<i64>,
}

/// What `start()` hands back to the manager.
pub struct StartOutcome {
    pub capabilities: SessionCapabilities,
    pub initial_state: StatePacket,
    pub frame_ref: Option<FrameRef>,
}

pub struct BrowserSession {
    id: String,
    trace_id: String,
    settings: SessionSettings,
    phase: Mutex<SessionPhase>,
    active: AtomicBool,
    created_at_ms: AtomicU64,
    step_index: AtomicU64,
    replay_index: AtomicU64,
    browser: Mutex<Option<Box<dyn BrowserHandle>>>,
    page: Mutex<Option<Arc<dyn DriverPage>>>,
    capture: Mutex<Option<Arc<CaptureCoordinator>>>,
    executor: Mutex<Option<Arc<ActionExecutor>>>,
    builder: Mutex<Option<Arc<StateBuilder>>>,
    netlog: Arc<NetworkLog>,
    net_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    replay: Arc<ReplayStore>,
}

impl BrowserSession {
    pub fn new(id: String, trace_id: String, settings: SessionSettings, replay: Arc<ReplayStore>) -> Arc<Self> {
        Arc::new(Self {
            id,
            trace_id,
            settings,
            phase: Mutex::new(SessionPhase::Created),
            active: AtomicBool::new(false),
            created_at_ms: AtomicU64::new(util::now_ms()),
            step_index: AtomicU64::new(0),
            replay_index: AtomicU64::new(0),
            browser: Mutex::new(None),
            page: Mutex::new(None),
            capture: Mutex::new(None),
            executor: Mutex::new(None),
            builder: Mutex::new(None),
            netlog: Arc::new(NetworkLog::new()),
            net_task: Mutex::new(None),
            replay,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms.load(Ordering::SeqCst)
    }

    pub fn step_index(&self) -> u64 {
        self.step_index.load(Ordering::SeqCst)
    }

    /// Refresh the activity timestamp; "oldest" for eviction means
    /// least-recently-active.
    pub fn touch(&self) {
        self.created_at_ms.store(util::now_ms(), Ordering::SeqCst);
    }

    pub fn capabilities(&self) -> SessionCapabilities {
        SessionCapabilities {
            capture_profile: self.settings.profile.as_str().to_string(),
            max_steps: self.settings.max_steps,
            max_duration_ms: self.settings.max_duration_ms,
            policy: self.settings.policy.name().to_string(),
            dom_first: true,
            frame_capture: self.settings.profile != CaptureProfile::DomOnly,
        }
    }

    /// Launch the browser, wire up observation streams, navigate to the
    /// target, and build the initial state packet. Any failure tears down
    /// everything acquired so far before propagating.
    pub async fn start(self: &Arc<Self>, driver: &dyn BrowserDriver) -> Result<StartOutcome> {
        {
            let mut phase = self.phase.lock();
            if *phase != SessionPhase::Created {
                bail!("session already started");
            }
            *phase = SessionPhase::Starting;
        }

        match self.start_inner(driver).await {
            Ok(outcome) => {
                *self.phase.lock() = SessionPhase::Active;
                self.active.store(true, Ordering::SeqCst);
                info!(session = %self.id, url = %self.settings.target_url, "session started");
                Ok(outcome)
            }
            Err(err) => {
                warn!(session = %self.id, "session start failed: {err:#}");
                self.teardown().await;
                *self.phase.lock() = SessionPhase::Stopped;
                Err(err)
            }
        }
    }

    async fn start_inner(self: &Arc<Self>, driver: &dyn BrowserDriver) -> Result<StartOutcome> {
        let browser = driver
            .launch(LaunchOptions {
                headless: self.settings.headless,
                viewport: self.settings.viewport,
                user_data_dir: self.settings.storage_state.clone(),
            })
            .await
            .context("browser launch failed")?;
        let page = browser
            .new_page(self.settings.viewport)
            .await
            .context("page creation failed")?;
        *self.browser.lock() = Some(browser);
        *self.page.lock() = Some(page.clone());

        // Network handlers append to the ring for the life of the page.
        let mut network = page.network_events().await?;
        let netlog = self.netlog.clone();
        let net_task = tokio::spawn(async move {
            while let Some(observation) = network.next().await {
                netlog.push(NetworkEvent::from_observation(&observation), NETWORK_LOG_CAP);
            }
        });
        *self.net_task.lock() = Some(net_task);

        let viewport = self.settings.viewport.unwrap_or_default();
        let capture = CaptureCoordinator::new(CaptureConfig {
            enabled: self.settings.profile != CaptureProfile::DomOnly,
            session_id: self.id.clone(),
            trace_id: self.trace_id.clone(),
            quality: SCREENCAST_QUALITY,
            max_width: viewport.width,
            max_height: viewport.height,
            max_frames: self.settings.frame_cap,
            adaptive: self.settings.profile == CaptureProfile::Adaptive,
            trace_dir: self.replay.trace_dir(&self.trace_id),
        });
        capture.start(page.clone()).await?;
        *self.capture.lock() = Some(capture.clone());

        let executor = Arc::new(ActionExecutor::new(page.clone(), self.netlog.clone()));
        *self.executor.lock() = Some(executor);
        let builder = Arc::new(StateBuilder::new(
            self.id.clone(),
            page.clone(),
            self.netlog.clone(),
            capture.clone(),
        ));
        *self.builder.lock() = Some(builder.clone());

        page.goto(&self.settings.target_url, NAVIGATION_TIMEOUT)
            .await
            .with_context(|| format!("initial navigation to {} failed", self.settings.target_url))?;

        // Seed the replay index from whatever the trace already holds so
        // indices stay dense and 1-based for this trace.
        let existing = self.replay.load(&self.trace_id)?.events.len() as u64;
        self.replay_index.store(existing, Ordering::SeqCst);

        let initial_state = builder
            .build(&CaptureSettings {
                include_dom: self.settings.profile != CaptureProfile::FramesOnly,
                include_ax: true,
                include_network: true,
                include_frames: self.settings.profile != CaptureProfile::DomOnly,
                max_frames: None,
            })
            .await?;

        self.append_replay(
            "create",
            json!({
                "session_id": self.id,
                "target_url": self.settings.target_url,
                "capabilities": self.capabilities(),
                "state_token": initial_state.state_token,
            }),
        )?;

        Ok(StartOutcome {
            capabilities: self.capabilities(),
            initial_state,
            frame_ref: capture.latest_frame(),
        })
    }

    /// Resolve the effective capture settings for a step.
    fn normalize_capture(&self, request: Option<&CaptureRequest>) -> CaptureSettings {
        let profile = self.settings.profile;
        let defaults = CaptureSettings {
            include_dom: profile != CaptureProfile::FramesOnly,
            include_ax: profile != CaptureProfile::FramesOnly,
            include_network: true,
            include_frames: profile != CaptureProfile::DomOnly,
            max_frames: None,
        };
        match request {
            None => defaults,
            Some(req) if req.has_no_include_flags() => CaptureSettings {
                max_frames: req.max_frames.map(|n| n.max(1) as usize),
                ..defaults
            },
            Some(req) => CaptureSettings {
                include_dom: req.include_dom.unwrap_or(false),
                include_ax: req.include_ax.unwrap_or(false),
                include_network: req.include_network.unwrap_or(false),
                include_frames: req.include_frames.unwrap_or(false),
                max_frames: req.max_frames.map(|n| n.max(1) as usize),
            },
        }
    }

    pub async fn step(&self, input: ActionInput) -> Result<StepResult> {
        let started = Instant::now();

        if !self.is_active() {
            bail!("session is not active");
        }
        if self.step_index.load(Ordering::SeqCst) >= self.settings.max_steps {
            bail!("max_steps reached");
        }
        let now = util::now_ms();
        if now.saturating_sub(self.created_at_ms()) > self.settings.max_duration_ms {
            bail!("session exceeded max_duration_ms");
        }

        let builder = self
            .builder
            .lock()
            .clone()
            .context("session is not active")?;
        let executor = self
            .executor
            .lock()
            .clone()
            .context("session is not active")?;
        let capture = self.capture.lock().clone();

        let settings = self.normalize_capture(input.capture.as_ref());
        let pre_state = builder.build(&settings).await?;

        let decision = self.settings.policy.evaluate(&input, &pre_state);
        if !decision.allowed {
            debug!(session = %self.id, action = %input.action, "policy denied");
            let queue_health = pre_state.queue_health.clone();
            let frame_refs = pre_state.frame_refs.clone();
            return Ok(StepResult {
                action_result: ActionResult::policy_denied(&input.action, decision.reason),
                error_codes: vec!["POLICY_DENIED".to_string()],
                next_recommendation: "halt".to_string(),
                latency_ms: started.elapsed().as_millis() as u64,
                frame_refs,
                queue_health,
                state: pre_state,
            });
        }

        let action_result = executor.execute(&input).await;
        if !action_result.success {
            metrics::global().record_action_failure();
        }

        if matches!(input.action.as_str(), "wait" | "wait_for") {
            if let Some(capture) = capture.as_ref() {
                capture.signal_visual_drift();
            }
        }

        let state = builder.build(&settings).await?;

        self.step_index.fetch_add(1, Ordering::SeqCst);
        self.touch();
        let latency_ms = started.elapsed().as_millis() as u64;
        metrics::global().record_step(latency_ms);

        let mut error_codes = Vec::new();
        if !action_result.success {
            error_codes.push("ACTION_FAILED".to_string());
        }
        if state.network_events.is_empty() {
            error_codes.push("NO_NETWORK_EVENT".to_string());
        }

        let next_recommendation = if action_result.success {
            "continue"
        } else if action_result
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("timeout")
        {
            "fallback_or_abandon"
        } else {
            "retry"
        }
        .to_string();

        self.append_replay(
            "step",
            json!({
                "session_id": self.id,
                "input": input,
                "action_result": action_result,
                "state_token": state.state_token,
            }),
        )?;

        Ok(StepResult {
            frame_refs: state.frame_refs.clone(),
            queue_health: state.queue_health.clone(),
            state,
            action_result,
            error_codes,
            next_recommendation,
            latency_ms,
        })
    }

    /// Build a packet honoring the caller's include flags literally.
    pub async fn snapshot(&self, request: SnapshotRequest) -> Result<StatePacket> {
        if !self.is_active() {
            bail!("session is not active");
        }
        let builder = self
            .builder
            .lock()
            .clone()
            .context("session is not active")?;
        let state = builder
            .build(&CaptureSettings {
                include_dom: request.include_dom,
                include_ax: request.include_ax,
                include_network: request.include_network,
                include_frames: request.include_frames,
                max_frames: request.max_frames.map(|n| n.max(1) as usize),
            })
            .await?;

        self.append_replay(
            "snapshot",
            json!({
                "session_id": self.id,
                "state_token": state.state_token,
            }),
        )?;
        Ok(state)
    }

    /// Stop the session. Idempotent: stopping a stopped session is a no-op.
    pub async fn stop(&self, preserve: bool) -> StopResult {
        let trace_path = self.replay.trace_path(&self.trace_id).display().to_string();
        {
            let mut phase = self.phase.lock();
            if matches!(*phase, SessionPhase::Stopping | SessionPhase::Stopped) {
                return StopResult {
                    status: "stopped".to_string(),
                    cleanup: "noop".to_string(),
                    trace_path,
                };
            }
            *phase = SessionPhase::Stopping;
        }
        self.active.store(false, Ordering::SeqCst);

        self.teardown().await;

        if let Err(err) = self.append_replay("stop", json!({ "session_id": self.id, "preserve": preserve })) {
            debug!(session = %self.id, "stop replay append failed: {err}");
        }

        let cleanup = if preserve {
            match self.replay.load(&self.trace_id) {
                Ok(manifest) => {
                    if let Err(err) = self.replay.persist_trace_index(&self.trace_id, &manifest.events) {
                        debug!(session = %self.id, "index persist failed: {err}");
                    }
                }
                Err(err) => debug!(session = %self.id, "trace load failed: {err}"),
            }
            "retained"
        } else {
            self.replay.cleanup(&self.trace_id);
            self.replay.remove_artifacts(&self.trace_id);
            "cleaned"
        };

        *self.phase.lock() = SessionPhase::Stopped;
        metrics::global().record_session_stopped();
        info!(session = %self.id, cleanup, "session stopped");

        StopResult {
            status: "stopped".to_string(),
            cleanup: cleanup.to_string(),
            trace_path,
        }
    }

    /// Release every acquired resource, swallowing individual failures.
    async fn teardown(&self) {
        if let Some(task) = self.net_task.lock().take() {
            task.abort();
        }
        let capture = self.capture.lock().take();
        if let Some(capture) = capture {
            capture.stop().await;
        }
        let page = self.page.lock().take();
        if let Some(page) = page {
            if let Err(err) = page.close().await {
                debug!("page close failed: {err}");
            }
        }
        let browser = self.browser.lock().take();
        if let Some(browser) = browser {
            if let Err(err) = browser.close().await {
                debug!("browser close failed: {err}");
            }
        }
        self.executor.lock().take();
        self.builder.lock().take();
    }

    fn append_replay(&self, event_type: &str, payload: Value) -> Result<()> {
        let index = self.replay_index.fetch_add(1, Ordering::SeqCst) + 1;
        self.replay.append(
            &self.trace_id,
            &ReplayEvent {
                event_type: event_type.to_string(),
                index,
                at: util::now_ms(),
                payload,
            },
        )
    }
}
