//! In-memory driver used by the session and capture tests.
//!
//! The mock page records every primitive it is asked to perform and lets a
//! test inject screencast frames and network observations through unbounded
//! channels, so the asynchronous paths run exactly as they do against a
//! real browser.

use super::{
    BrowserDriver, BrowserHandle, DriverPage, LaunchOptions, LoadState, NetworkObservation,
    ScreencastFrame, ScreencastOptions, Viewport,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Default)]
pub struct MockDriver {
    pub page: Arc<MockPage>,
    launches: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(page: Arc<MockPage>) -> Self {
        Self {
            page,
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn launch(&self, _opts: LaunchOptions) -> Result<Box<dyn BrowserHandle>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBrowser {
            page: self.page.clone(),
        }))
    }
}

pub struct MockBrowser {
    page: Arc<MockPage>,
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    async fn new_page(&self, _viewport: Option<Viewport>) -> Result<Arc<dyn DriverPage>> {
        Ok(self.page.clone())
    }

    async fn close(&self) -> Result<()> {
        self.page.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockPage {
    pub url: Mutex<String>,
    pub title: Mutex<String>,
    /// Value returned by `evaluate` for the DOM summary script.
    pub dom_summary: Mutex<Value>,
    pub ax_tree: Mutex<Option<Value>>,
    /// Selectors that resolve, with their match counts.
    pub selectors: Mutex<std::collections::HashMap<String, usize>>,
    /// Every primitive invoked, in order ("goto https://…", "click #id", …).
    pub calls: Mutex<Vec<String>>,
    pub acked_frames: Mutex<Vec<i64>>,
    pub screencast_active: AtomicBool,
    pub closed: AtomicBool,
    pub fail_next_action: AtomicBool,
    frame_tx: Mutex<Option<mpsc::UnboundedSender<ScreencastFrame>>>,
    network_tx: Mutex<Option<mpsc::UnboundedSender<NetworkObservation>>>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self {
            url: Mutex::new("https://example.com/".to_string()),
            title: Mutex::new("Example Domain".to_string()),
            dom_summary: Mutex::new(json!({
                "interactive_count": 2,
                "text_inputs": 1,
                "buttons": 1,
                "links": 0,
                "iframes": 0,
                "canvas_nodes": 0,
                "top_elements": [
                    {
                        "tag": "button",
                        "id": "go",
                        "name": null,
                        "role": "button",
                        "text": "Go",
                        "bounds": {"x": 10, "y": 20, "width": 80, "height": 24}
                    },
                    {
                        "tag": "input",
                        "id": null,
                        "name": "q",
                        "role": null,
                        "text": "",
                        "bounds": {"x": 10, "y": 60, "width": 200, "height": 24}
                    }
                ]
            })),
            ax_tree: Mutex::new(Some(json!([{"role": "button", "name": "Go"}]))),
            selectors: Mutex::new(std::collections::HashMap::new()),
            calls: Mutex::new(Vec::new()),
            acked_frames: Mutex::new(Vec::new()),
            screencast_active: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_next_action: AtomicBool::new(false),
            frame_tx: Mutex::new(None),
            network_tx: Mutex::new(None),
        }
    }
}

impl MockPage {
    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn check_failure(&self, what: &str) -> Result<()> {
        if self.fail_next_action.swap(false, Ordering::SeqCst) {
            bail!("injected failure during {what}");
        }
        Ok(())
    }

    /// Push a screencast frame as if the driver delivered it.
    pub fn push_frame(&self, frame: ScreencastFrame) {
        if let Some(tx) = self.frame_tx.lock().as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Push a network observation as if the page produced traffic.
    pub fn push_network(&self, observation: NetworkObservation) {
        if let Some(tx) = self.network_tx.lock().as_ref() {
            let _ = tx.send(observation);
        }
    }

    pub fn set_url(&self, url: &str) {
        *self.url.lock() = url.to_string();
    }

    pub fn add_selector(&self, selector: &str, count: usize) {
        self.selectors.lock().insert(selector.to_string(), count);
    }
}

#[async_trait]
impl DriverPage for MockPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.check_failure("goto")?;
        self.record(format!("goto {url}"));
        self.set_url(url);
        Ok(())
    }

    async fn current_url(&self) -> String {
        self.url.lock().clone()
    }

    async fn title(&self) -> Result<String> {
        Ok(self.title.lock().clone())
    }

    async fn evaluate(&self, _expression: &str) -> Result<Value> {
        Ok(self.dom_summary.lock().clone())
    }

    async fn accessibility_snapshot(&self) -> Result<Option<Value>> {
        Ok(self.ax_tree.lock().clone())
    }

    async fn selector_count(&self, selector: &str) -> Result<usize> {
        Ok(self.selectors.lock().get(selector).copied().unwrap_or(0))
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        if self.selector_count(selector).await? == 0 {
            bail!("timeout waiting for selector '{selector}'");
        }
        Ok(())
    }

    async fn click_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.check_failure("click")?;
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn hover_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("hover {selector}"));
        Ok(())
    }

    async fn fill_selector(&self, selector: &str, text: &str, _timeout: Duration) -> Result<()> {
        self.check_failure("fill")?;
        self.record(format!("fill {selector} {text}"));
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("mouse_move {x} {y}"));
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.check_failure("mouse_click")?;
        self.record(format!("mouse_click {x} {y}"));
        Ok(())
    }

    async fn mouse_down(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("mouse_down {x} {y}"));
        Ok(())
    }

    async fn mouse_up(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("mouse_up {x} {y}"));
        Ok(())
    }

    async fn wheel(&self, delta_x: f64, delta_y: f64) -> Result<()> {
        self.record(format!("wheel {delta_x} {delta_y}"));
        Ok(())
    }

    async fn press_key(&self, key: &str, _delay: Duration) -> Result<()> {
        self.record(format!("press {key}"));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(format!("type {text}"));
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, _timeout: Duration) -> Result<()> {
        self.record(format!("wait_for_load_state {state:?}"));
        Ok(())
    }

    async fn network_events(&self) -> Result<BoxStream<'static, NetworkObservation>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.network_tx.lock() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn screencast_frames(&self) -> Result<BoxStream<'static, ScreencastFrame>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.frame_tx.lock() = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn start_screencast(&self, _opts: ScreencastOptions) -> Result<()> {
        self.screencast_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ack_screencast_frame(&self, channel_id: i64) -> Result<()> {
        self.acked_frames.lock().push(channel_id);
        Ok(())
    }

    async fn stop_screencast(&self) -> Result<()> {
        self.screencast_active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
