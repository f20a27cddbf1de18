//! Browser-driver capability seam.
//!
//! The session runtime treats the browser as a capability provider behind
//! these traits: launch, page creation, navigation, in-page evaluation,
//! input primitives, selector waits, accessibility snapshot, a
//! request/response/failure event stream, and a screencast channel with
//! frame acknowledgement. The default implementation drives Chromium over
//! CDP (see [`cdp`]); tests substitute an in-memory mock.
//!
//! Implementations must be `Send + Sync`: pages are shared between the
//! step control path and the capture consumer task.

pub mod cdp;
#[cfg(any(test, feature = "mock-driver"))]
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Options for launching a browser process.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Option<Viewport>,
    /// Persisted browser storage (cookies, local storage) as a profile dir.
    pub user_data_dir: Option<PathBuf>,
}

/// Options for starting a screencast on a page.
#[derive(Debug, Clone, Copy)]
pub struct ScreencastOptions {
    pub quality: u32,
    pub max_width: u32,
    pub max_height: u32,
}

/// A single screencast frame pushed by the driver.
///
/// `channel_id` identifies the frame on the remote-debug channel and must be
/// echoed back through [`DriverPage::ack_screencast_frame`]; frames without
/// one need no acknowledgement.
#[derive(Debug, Clone, Default)]
pub struct ScreencastFrame {
    pub channel_id: Option<i64>,
    /// Base64-encoded JPEG payload; absent on metadata-only frames.
    pub data: Option<String>,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEventKind {
    Request,
    Response,
    Failure,
}

/// A raw network observation from the driver, before ring normalization.
#[derive(Debug, Clone)]
pub struct NetworkObservation {
    pub kind: NetworkEventKind,
    pub id: String,
    pub url: String,
    pub method: Option<String>,
    pub status: Option<i64>,
    pub resource_type: Option<String>,
    pub failure_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    NetworkIdle,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Launch a browser process and return a handle owning it.
    async fn launch(&self, opts: LaunchOptions) -> Result<Box<dyn BrowserHandle>>;
}

#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Open a fresh page, applying the viewport when given.
    async fn new_page(&self, viewport: Option<Viewport>) -> Result<Arc<dyn DriverPage>>;

    /// Close the browser process. Idempotent, best-effort.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait DriverPage: Send + Sync {
    /// Navigate and wait for `domcontentloaded`, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> String;

    async fn title(&self) -> Result<String>;

    /// Evaluate a JavaScript expression in the page, returning its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Accessibility tree snapshot restricted to interesting nodes.
    /// Returns `None` when the tree cannot be fetched.
    async fn accessibility_snapshot(&self) -> Result<Option<serde_json::Value>>;

    /// Number of nodes currently matching a CSS selector.
    async fn selector_count(&self, selector: &str) -> Result<usize>;

    /// Wait until at least one visible node matches the selector.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn click_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn hover_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Scroll the first match into view and fill it with `text`.
    async fn fill_selector(&self, selector: &str, text: &str, timeout: Duration) -> Result<()>;

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()>;

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()>;

    async fn mouse_down(&self, x: f64, y: f64) -> Result<()>;

    async fn mouse_up(&self, x: f64, y: f64) -> Result<()>;

    async fn wheel(&self, delta_x: f64, delta_y: f64) -> Result<()>;

    async fn press_key(&self, key: &str, delay: Duration) -> Result<()>;

    /// Type text into the focused element, one keystroke per character.
    async fn type_text(&self, text: &str) -> Result<()>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> Result<()>;

    /// Stream of request/response/failure observations for this page.
    async fn network_events(&self) -> Result<BoxStream<'static, NetworkObservation>>;

    /// Stream of screencast frames. Subscribe before starting the cast.
    async fn screencast_frames(&self) -> Result<BoxStream<'static, ScreencastFrame>>;

    async fn start_screencast(&self, opts: ScreencastOptions) -> Result<()>;

    /// Acknowledge a screencast frame so the driver keeps streaming.
    async fn ack_screencast_frame(&self, channel_id: i64) -> Result<()>;

    async fn stop_screencast(&self) -> Result<()>;

    /// Close the page. Idempotent, best-effort.
    async fn close(&self) -> Result<()>;
}
