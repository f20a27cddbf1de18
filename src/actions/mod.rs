//! Action executor: runs exactly one browser action under a caller-supplied
//! timeout, preferring DOM selectors and falling back to coordinates.

use crate::driver::{DriverPage, LoadState};
use crate::session::netlog::{NetworkEvent, NetworkLog, ACTION_EVENT_CAP};
use crate::state::CaptureRequest;
use crate::util;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 8_000;
/// Hard ceiling applied on top of the effective timeout.
const DEADLINE_GRACE_MS: u64 = 300;
/// Key-press down/up delay.
const KEY_PRESS_DELAY: Duration = Duration::from_millis(20);
const DRAG_STEPS: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionInput {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub delta_x: Option<f64>,
    #[serde(default)]
    pub delta_y: Option<f64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_actions_per_step: Option<u32>,
    #[serde(default)]
    pub capture: Option<CaptureRequest>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: String,
    pub success: bool,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl ActionResult {
    /// Result for a step the policy adapter refused; nothing was executed.
    pub fn policy_denied(action: &str, reason: Option<String>) -> Self {
        Self {
            action: action.to_string(),
            success: false,
            status: "policy_denied".to_string(),
            target: None,
            selector: None,
            coordinates: None,
            detail: reason,
            elapsed_ms: 0,
        }
    }
}

/// What the dispatch path ended up touching.
#[derive(Debug, Default)]
struct Touch {
    selector: Option<String>,
    coordinates: Option<Coordinates>,
}

enum TargetPath {
    Selector(String),
    Coordinates(f64, f64),
}

pub struct ActionExecutor {
    page: Arc<dyn DriverPage>,
    netlog: Arc<NetworkLog>,
}

impl ActionExecutor {
    pub fn new(page: Arc<dyn DriverPage>, netlog: Arc<NetworkLog>) -> Self {
        Self { page, netlog }
    }

    /// Execute one action and return a structural result; failures never
    /// propagate as errors. A synthetic network event is appended for every
    /// execution so actions interleave causally with real traffic.
    pub async fn execute(&self, input: &ActionInput) -> ActionResult {
        let started = Instant::now();
        let timeout_ms = input
            .timeout_ms
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);

        if input.max_actions_per_step.unwrap_or(1) > 1 {
            let result = self.failure(
                input,
                "max_actions_per_step must be 1 in phase 1".to_string(),
                started,
            );
            self.append_action_event(&result).await;
            return result;
        }

        let deadline = Duration::from_millis(timeout_ms + DEADLINE_GRACE_MS);
        let timeout = Duration::from_millis(timeout_ms);

        let outcome = tokio::time::timeout(deadline, self.dispatch(input, timeout)).await;
        let result = match outcome {
            Ok(Ok(touch)) => ActionResult {
                action: input.action.clone(),
                success: true,
                status: "completed".to_string(),
                target: Some(self.page.current_url().await),
                selector: touch.selector,
                coordinates: touch.coordinates,
                detail: None,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(err)) => self.failure(input, err.to_string(), started),
            Err(_) => self.failure(input, format!("action timeout after {timeout_ms}ms"), started),
        };

        self.append_action_event(&result).await;
        result
    }

    fn failure(&self, input: &ActionInput, detail: String, started: Instant) -> ActionResult {
        ActionResult {
            action: input.action.clone(),
            success: false,
            status: "failed".to_string(),
            target: None,
            selector: None,
            coordinates: None,
            detail: Some(detail),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn dispatch(&self, input: &ActionInput, timeout: Duration) -> Result<Touch> {
        match input.action.as_str() {
            "navigate" => {
                let Some(url) = input.url.as_deref() else {
                    bail!("navigate requires url");
                };
                self.page.goto(url, timeout).await?;
                Ok(Touch::default())
            }
            "click" => match self.resolve_target(input).await? {
                TargetPath::Selector(selector) => {
                    self.page.click_selector(&selector, timeout).await?;
                    Ok(Touch {
                        selector: Some(selector),
                        ..Touch::default()
                    })
                }
                TargetPath::Coordinates(x, y) => {
                    self.page.mouse_click(x, y).await?;
                    Ok(Touch {
                        coordinates: Some(Coordinates { x, y }),
                        ..Touch::default()
                    })
                }
            },
            "hover" => match self.resolve_target(input).await? {
                TargetPath::Selector(selector) => {
                    self.page.hover_selector(&selector, timeout).await?;
                    Ok(Touch {
                        selector: Some(selector),
                        ..Touch::default()
                    })
                }
                TargetPath::Coordinates(x, y) => {
                    self.page.mouse_move(x, y).await?;
                    Ok(Touch {
                        coordinates: Some(Coordinates { x, y }),
                        ..Touch::default()
                    })
                }
            },
            "type" => {
                let Some(text) = input.text.as_deref() else {
                    bail!("type requires text");
                };
                match self.resolve_target(input).await? {
                    TargetPath::Selector(selector) => {
                        self.page.fill_selector(&selector, text, timeout).await?;
                        Ok(Touch {
                            selector: Some(selector),
                            ..Touch::default()
                        })
                    }
                    TargetPath::Coordinates(x, y) => {
                        self.page.mouse_click(x, y).await?;
                        self.page.type_text(text).await?;
                        Ok(Touch {
                            coordinates: Some(Coordinates { x, y }),
                            ..Touch::default()
                        })
                    }
                }
            }
            "press" => {
                let Some(key) = input.key.as_deref() else {
                    bail!("press requires key");
                };
                self.page.press_key(key, KEY_PRESS_DELAY).await?;
                Ok(Touch::default())
            }
            "scroll" => {
                if let (Some(x), Some(y)) = (input.x, input.y) {
                    self.page.mouse_move(x, y).await?;
                }
                self.page
                    .wheel(input.delta_x.unwrap_or(0.0), input.delta_y.unwrap_or(0.0))
                    .await?;
                Ok(Touch::default())
            }
            "drag" => {
                let (Some(x), Some(y), Some(dx), Some(dy)) =
                    (input.x, input.y, input.delta_x, input.delta_y)
                else {
                    bail!("drag requires x, y, delta_x and delta_y");
                };
                self.page.mouse_down(x, y).await?;
                for step in 1..=DRAG_STEPS {
                    let progress = f64::from(step) / f64::from(DRAG_STEPS);
                    self.page
                        .mouse_move(x + dx * progress, y + dy * progress)
                        .await?;
                }
                self.page.mouse_up(x + dx, y + dy).await?;
                Ok(Touch {
                    coordinates: Some(Coordinates { x, y }),
                    ..Touch::default()
                })
            }
            "wait" => {
                let ms = input.timeout_ms.unwrap_or(1000).min(MAX_TIMEOUT_MS);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Touch::default())
            }
            "wait_for" => {
                let target = input
                    .target
                    .as_deref()
                    .or(input.selector.as_deref())
                    .unwrap_or_default();
                match target {
                    "" => bail!("wait_for requires a target"),
                    "networkidle" | "network_idle" => {
                        self.page
                            .wait_for_load_state(LoadState::NetworkIdle, timeout)
                            .await?;
                        Ok(Touch::default())
                    }
                    "stable" | "domstable" => {
                        self.page
                            .wait_for_load_state(LoadState::DomContentLoaded, timeout)
                            .await?;
                        Ok(Touch::default())
                    }
                    selector => {
                        self.page.wait_for_selector(selector, timeout).await?;
                        Ok(Touch {
                            selector: Some(selector.to_string()),
                            ..Touch::default()
                        })
                    }
                }
            }
            other => bail!("unsupported action '{other}'"),
        }
    }

    /// Selector path when the selector resolves to at least one node,
    /// coordinate path otherwise.
    async fn resolve_target(&self, input: &ActionInput) -> Result<TargetPath> {
        if let Some(selector) = input.selector.as_deref() {
            if self.page.selector_count(selector).await.unwrap_or(0) >= 1 {
                return Ok(TargetPath::Selector(selector.to_string()));
            }
        }
        if let (Some(x), Some(y)) = (input.x, input.y) {
            return Ok(TargetPath::Coordinates(x, y));
        }
        bail!("selector not found and coordinates missing");
    }

    async fn append_action_event(&self, result: &ActionResult) {
        let now = util::now_ms();
        let event = NetworkEvent {
            id: format!("{now}:{}", result.action),
            url: self.page.current_url().await,
            method: result.action.clone(),
            status: Some(if result.success { 200 } else { 0 }),
            event_type: Some(
                if result.success {
                    "action"
                } else {
                    "action_failed"
                }
                .to_string(),
            ),
            time: now,
            failure_text: result.detail.clone(),
        };
        self.netlog.push(event, ACTION_EVENT_CAP);
    }
}
