//! State builder: merges DOM, accessibility, network, and frame
//! observations into a single state packet with a change-detection token.

use crate::capture::{CaptureCoordinator, FrameRef, QueueHealth};
use crate::driver::DriverPage;
use crate::session::netlog::{NetworkEvent, NetworkLog};
use crate::util;
use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// How many ring events a packet includes at most.
const NETWORK_SAMPLE: usize = 100;
/// Default frame sample when the caller gives no override.
const DEFAULT_FRAME_SAMPLE: usize = 6;
/// Max characters of element text carried in a summary.
const ELEMENT_TEXT_LIMIT: usize = 64;
/// Synthetic region detections carry a fixed confidence.
const REGION_CONFIDENCE: f64 = 0.78;

/// In-page evaluator producing the DOM summary. Counts interactive nodes
/// and returns the first 12 with their bounding boxes.
const DOM_SUMMARY_SCRIPT: &str = r#"(() => {
  const interactive = Array.from(document.querySelectorAll(
    'button, input, textarea, select, a, [role="button"], [role="link"], [onclick], canvas'));
  return {
    interactive_count: interactive.length,
    text_inputs: document.querySelectorAll('input, textarea').length,
    buttons: document.querySelectorAll('button, [role="button"]').length,
    links: document.querySelectorAll('a, [role="link"]').length,
    iframes: document.querySelectorAll('iframe').length,
    canvas_nodes: document.querySelectorAll('canvas').length,
    top_elements: interactive.slice(0, 12).map((el) => {
      const rect = el.getBoundingClientRect();
      return {
        tag: el.tagName.toLowerCase(),
        id: el.id || null,
        name: el.getAttribute('name'),
        role: el.getAttribute('role'),
        text: ((el.innerText || el.value || '') + '').trim().slice(0, 64),
        bounds: {
          x: Math.round(rect.x),
          y: Math.round(rect.y),
          width: Math.round(rect.width),
          height: Math.round(rect.height),
        },
      };
    }),
  };
})()"#;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementBounds {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl ElementBounds {
    fn clamped(self) -> Self {
        Self {
            x: self.x.max(0),
            y: self.y.max(0),
            width: self.width.max(0),
            height: self.height.max(0),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomElement {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounds: ElementBounds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomSummary {
    #[serde(default)]
    pub interactive_count: u64,
    #[serde(default)]
    pub text_inputs: u64,
    #[serde(default)]
    pub buttons: u64,
    #[serde(default)]
    pub links: u64,
    #[serde(default)]
    pub iframes: u64,
    #[serde(default)]
    pub canvas_nodes: u64,
    #[serde(default)]
    pub top_elements: Vec<DomElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDetection {
    pub label: String,
    pub bounds: ElementBounds,
    pub confidence: f64,
}

/// Effective include flags for one packet build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSettings {
    pub include_dom: bool,
    pub include_ax: bool,
    pub include_network: bool,
    pub include_frames: bool,
    pub max_frames: Option<usize>,
}

/// Caller-supplied capture block on step/snapshot requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub include_dom: Option<bool>,
    #[serde(default)]
    pub include_ax: Option<bool>,
    #[serde(default)]
    pub include_network: Option<bool>,
    #[serde(default)]
    pub include_frames: Option<bool>,
    #[serde(default)]
    pub max_frames: Option<i64>,
}

impl CaptureRequest {
    /// True when the caller set none of the include flags.
    pub fn has_no_include_flags(&self) -> bool {
        self.include_dom.is_none()
            && self.include_ax.is_none()
            && self.include_network.is_none()
            && self.include_frames.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePacket {
    pub state_token: String,
    pub timestamp: u64,
    pub session_id: String,
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom: Option<DomSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<Value>,
    #[serde(default)]
    pub network_events: Vec<NetworkEvent>,
    #[serde(default)]
    pub frame_refs: Vec<FrameRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_detections: Option<Vec<RegionDetection>>,
    pub change_tokens: Vec<String>,
    pub queue_health: QueueHealth,
}

/// Structural copy of a packet with the session id re-stamped and a fresh
/// queue-health copy.
pub fn with_session_id(state: &StatePacket, session_id: &str) -> StatePacket {
    let mut copy = state.clone();
    copy.session_id = session_id.to_string();
    copy.queue_health = state.queue_health.clone();
    copy
}

pub struct StateBuilder {
    session_id: String,
    page: Arc<dyn DriverPage>,
    netlog: Arc<NetworkLog>,
    capture: Arc<CaptureCoordinator>,
    last_token: Mutex<Option<String>>,
}

impl StateBuilder {
    pub fn new(
        session_id: String,
        page: Arc<dyn DriverPage>,
        netlog: Arc<NetworkLog>,
        capture: Arc<CaptureCoordinator>,
    ) -> Self {
        Self {
            session_id,
            page,
            netlog,
            capture,
            last_token: Mutex::new(None),
        }
    }

    /// Build a state packet by sampling every requested observation source.
    pub async fn build(&self, settings: &CaptureSettings) -> Result<StatePacket> {
        let url = self.page.current_url().await;
        let title = self.page.title().await.unwrap_or_default();

        let dom = if settings.include_dom {
            Some(self.dom_summary().await?)
        } else {
            None
        };

        let accessibility = if settings.include_ax {
            self.page.accessibility_snapshot().await.unwrap_or(None)
        } else {
            None
        };

        let network_events = if settings.include_network {
            self.netlog.last_n(NETWORK_SAMPLE)
        } else {
            Vec::new()
        };

        let frame_refs = if settings.include_frames {
            let sample = settings.max_frames.unwrap_or(DEFAULT_FRAME_SAMPLE).max(1);
            self.capture.recent_frames(sample)
        } else {
            Vec::new()
        };

        let state_token = state_token(&url, &title, dom.as_ref(), network_events.len(), frame_refs.len());
        let change_tokens = self.change_tokens(&state_token);
        let region_detections = dom.as_ref().map(|summary| region_detections(summary));

        Ok(StatePacket {
            state_token,
            timestamp: util::now_ms(),
            session_id: self.session_id.clone(),
            url,
            title,
            dom,
            accessibility,
            network_events,
            frame_refs,
            region_detections,
            change_tokens,
            queue_health: self.capture.queue_health(),
        })
    }

    async fn dom_summary(&self) -> Result<DomSummary> {
        let raw = self.page.evaluate(DOM_SUMMARY_SCRIPT).await?;
        let mut summary: DomSummary = serde_json::from_value(raw).unwrap_or_default();
        summary.top_elements.truncate(12);
        for element in &mut summary.top_elements {
            element.bounds = element.bounds.clamped();
            element.text = util::truncate_chars(&element.text, ELEMENT_TEXT_LIMIT);
        }
        Ok(summary)
    }

    fn change_tokens(&self, token: &str) -> Vec<String> {
        let mut last = self.last_token.lock();
        let tag = match last.as_deref() {
            None => "INIT",
            Some(previous) if previous == token => "NO_CHANGE",
            Some(_) => "STATE_CHANGED",
        };
        *last = Some(token.to_string());
        vec![tag.to_string()]
    }
}

/// Deterministic content hash over the packet's identity subset. Keys are
/// serialized in sorted order, so identical inputs always produce identical
/// tokens.
pub fn state_token(
    url: &str,
    title: &str,
    dom: Option<&DomSummary>,
    network_count: usize,
    frame_count: usize,
) -> String {
    let dom_counts = dom.map_or_else(
        || json!({}),
        |summary| {
            json!({
                "interactive_count": summary.interactive_count,
                "buttons": summary.buttons,
                "text_inputs": summary.text_inputs,
                "links": summary.links,
                "iframes": summary.iframes,
                "canvas_nodes": summary.canvas_nodes,
            })
        },
    );
    let canonical = json!({
        "url": url,
        "title": title,
        "dom": dom_counts,
        "networkCount": network_count,
        "frameCount": frame_count,
    });
    util::sha1_hex(canonical.to_string().as_bytes())
}

fn region_detections(summary: &DomSummary) -> Vec<RegionDetection> {
    summary
        .top_elements
        .iter()
        .map(|element| {
            let label = match &element.id {
                Some(id) if !id.is_empty() => format!("{}[#{id}]", element.tag),
                _ => element.tag.clone(),
            };
            RegionDetection {
                label,
                bounds: element.bounds,
                confidence: REGION_CONFIDENCE,
            }
        })
        .collect()
}
