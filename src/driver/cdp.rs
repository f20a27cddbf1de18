//! Chromium DevTools Protocol driver backed by `chromiumoxide`.
//!
//! One browser process per launch, one CDP websocket per page. The handler
//! task must be polled for the connection to make progress, so it is
//! spawned immediately after launch and aborted on close.

use super::{
    BrowserDriver, BrowserHandle, DriverPage, LaunchOptions, LoadState, NetworkEventKind,
    NetworkObservation, ScreencastFrame, ScreencastOptions, Viewport,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::accessibility::GetFullAxTreeParams;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventScreencastFrame, ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams,
    StopScreencastParams,
};
use chromiumoxide::page::Page;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hardened launch flags for an automation browser.
const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
];

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone, Copy)]
pub struct CdpDriver;

impl CdpDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    async fn launch(&self, opts: LaunchOptions) -> Result<Box<dyn BrowserHandle>> {
        let mut builder = BrowserConfig::builder().args(LAUNCH_ARGS.to_vec());
        if !opts.headless {
            builder = builder.with_head();
        }
        if let Some(viewport) = opts.viewport {
            builder = builder.window_size(viewport.width, viewport.height);
        }
        if let Some(dir) = &opts.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!("cdp handler closed: {err}");
                    break;
                }
            }
        });

        Ok(Box::new(CdpBrowser {
            browser: tokio::sync::Mutex::new(Some(browser)),
            handler_task,
        }))
    }
}

pub struct CdpBrowser {
    browser: tokio::sync::Mutex<Option<Browser>>,
    handler_task: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl BrowserHandle for CdpBrowser {
    async fn new_page(&self, viewport: Option<Viewport>) -> Result<Arc<dyn DriverPage>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().context("browser already closed")?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;

        if let Some(viewport) = viewport {
            let params = SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(viewport.width))
                .height(i64::from(viewport.height))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| anyhow!("invalid viewport override: {e}"))?;
            page.execute(params)
                .await
                .context("failed to apply viewport")?;
        }

        Ok(Arc::new(CdpPage {
            page,
            mouse_position: Mutex::new((0.0, 0.0)),
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(err) = browser.close().await {
                warn!("browser close failed: {err}");
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        Ok(())
    }
}

pub struct CdpPage {
    page: Page,
    mouse_position: Mutex<(f64, f64)>,
}

impl CdpPage {
    /// Embed a selector into a script as a JS string literal.
    fn selector_literal(selector: &str) -> String {
        serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string())
    }

    async fn first_match_point(&self, selector: &str) -> Result<(f64, f64)> {
        let literal = Self::selector_literal(selector);
        let script = format!(
            "(() => {{ const el = document.querySelector({literal}); if (!el) return null; \
             el.scrollIntoView({{block: 'center', inline: 'center'}}); \
             const r = el.getBoundingClientRect(); \
             return {{ x: r.x + r.width / 2, y: r.y + r.height / 2 }}; }})()"
        );
        let value = self.evaluate(&script).await?;
        let x = value.get("x").and_then(Value::as_f64);
        let y = value.get("y").and_then(Value::as_f64);
        match (x, y) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => bail!("selector '{selector}' not found"),
        }
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
    ) -> Result<()> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
        if let Some(button) = button {
            builder = builder.button(button).click_count(1);
        }
        let params = builder
            .build()
            .map_err(|e| anyhow!("invalid mouse event: {e}"))?;
        self.page.execute(params).await?;
        *self.mouse_position.lock() = (x, y);
        Ok(())
    }

    async fn ready_state(&self) -> Result<String> {
        let value = self.evaluate("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

/// Map a CDP event struct to loosely typed JSON so field access does not
/// depend on generated type details (`Binary`, id newtypes).
fn event_json<T: serde::Serialize>(event: &T) -> Value {
    serde_json::to_value(event).unwrap_or(Value::Null)
}

fn observation_from_request(event: &EventRequestWillBeSent) -> NetworkObservation {
    let value = event_json(event);
    NetworkObservation {
        kind: NetworkEventKind::Request,
        id: json_str(&value, "/requestId"),
        url: json_str(&value, "/request/url"),
        method: json_opt_str(&value, "/request/method"),
        status: None,
        resource_type: json_opt_str(&value, "/type").map(|t| t.to_ascii_lowercase()),
        failure_text: None,
    }
}

fn observation_from_response(event: &EventResponseReceived) -> NetworkObservation {
    let value = event_json(event);
    NetworkObservation {
        kind: NetworkEventKind::Response,
        id: json_str(&value, "/requestId"),
        url: json_str(&value, "/response/url"),
        method: None,
        status: value.pointer("/response/status").and_then(Value::as_i64),
        resource_type: json_opt_str(&value, "/type").map(|t| t.to_ascii_lowercase()),
        failure_text: None,
    }
}

fn observation_from_failure(event: &EventLoadingFailed) -> NetworkObservation {
    let value = event_json(event);
    NetworkObservation {
        kind: NetworkEventKind::Failure,
        id: json_str(&value, "/requestId"),
        url: String::new(),
        method: None,
        status: None,
        resource_type: json_opt_str(&value, "/type").map(|t| t.to_ascii_lowercase()),
        failure_text: json_opt_str(&value, "/errorText"),
    }
}

fn screencast_frame_from_event(event: &EventScreencastFrame) -> ScreencastFrame {
    let value = event_json(event);
    ScreencastFrame {
        channel_id: value.pointer("/sessionId").and_then(Value::as_i64),
        data: json_opt_str(&value, "/data"),
        width: value
            .pointer("/metadata/deviceWidth")
            .and_then(Value::as_f64)
            .unwrap_or_default() as u32,
        height: value
            .pointer("/metadata/deviceHeight")
            .and_then(Value::as_f64)
            .unwrap_or_default() as u32,
        scale: value
            .pointer("/metadata/pageScaleFactor")
            .and_then(Value::as_f64)
            .unwrap_or(1.0),
    }
}

fn json_str(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn json_opt_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl DriverPage for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigation = async {
            self.page
                .goto(url)
                .await
                .with_context(|| format!("navigation to {url} failed"))?;
            let _ = self.page.wait_for_navigation().await;
            Ok::<(), anyhow::Error>(())
        };
        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| anyhow!("navigation to {url} timed out"))??;
        self.wait_for_load_state(LoadState::DomContentLoaded, timeout)
            .await
    }

    async fn current_url(&self) -> String {
        self.page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    async fn title(&self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .context("evaluation failed")?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn accessibility_snapshot(&self) -> Result<Option<Value>> {
        let response = match self.page.execute(GetFullAxTreeParams::default()).await {
            Ok(response) => response,
            Err(err) => {
                debug!("accessibility snapshot unavailable: {err}");
                return Ok(None);
            }
        };
        let tree = event_json(&response.result);
        let nodes = tree.pointer("/nodes").cloned().unwrap_or(Value::Null);
        let interesting: Vec<Value> = match nodes {
            Value::Array(nodes) => nodes
                .into_iter()
                .filter(|node| {
                    !node
                        .pointer("/ignored")
                        .and_then(Value::as_bool)
                        .unwrap_or(false)
                })
                .collect(),
            _ => return Ok(None),
        };
        Ok(Some(Value::Array(interesting)))
    }

    async fn selector_count(&self, selector: &str) -> Result<usize> {
        let literal = Self::selector_literal(selector);
        let script = format!("document.querySelectorAll({literal}).length");
        let value = self.evaluate(&script).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let literal = Self::selector_literal(selector);
        let script = format!(
            "(() => {{ const el = document.querySelector({literal}); if (!el) return false; \
             const r = el.getBoundingClientRect(); return r.width > 0 && r.height > 0; }})()"
        );
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.evaluate(&script).await?.as_bool().unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("timeout waiting for selector '{selector}'");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn click_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.wait_for_selector(selector, timeout).await?;
        let (x, y) = self.first_match_point(selector).await?;
        self.mouse_click(x, y).await
    }

    async fn hover_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.wait_for_selector(selector, timeout).await?;
        let (x, y) = self.first_match_point(selector).await?;
        self.mouse_move(x, y).await
    }

    async fn fill_selector(&self, selector: &str, text: &str, timeout: Duration) -> Result<()> {
        self.wait_for_selector(selector, timeout).await?;
        let (x, y) = self.first_match_point(selector).await?;
        self.mouse_click(x, y).await?;
        let literal = Self::selector_literal(selector);
        // Clear any existing value before typing so fill is idempotent.
        let clear = format!(
            "(() => {{ const el = document.querySelector({literal}); if (el && 'value' in el) \
             {{ el.value = ''; el.dispatchEvent(new Event('input', {{bubbles: true}})); }} }})()"
        );
        let _ = self.evaluate(&clear).await;
        self.type_text(text).await
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, x, y, None)
            .await
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.mouse_move(x, y).await?;
        self.mouse_down(x, y).await?;
        self.mouse_up(x, y).await
    }

    async fn mouse_down(&self, x: f64, y: f64) -> Result<()> {
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, x, y, Some(MouseButton::Left))
            .await
    }

    async fn mouse_up(&self, x: f64, y: f64) -> Result<()> {
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, x, y, Some(MouseButton::Left))
            .await
    }

    async fn wheel(&self, delta_x: f64, delta_y: f64) -> Result<()> {
        let (x, y) = *self.mouse_position.lock();
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(x)
            .y(y)
            .delta_x(delta_x)
            .delta_y(delta_y)
            .build()
            .map_err(|e| anyhow!("invalid wheel event: {e}"))?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn press_key(&self, key: &str, delay: Duration) -> Result<()> {
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key.to_string())
            .build()
            .map_err(|e| anyhow!("invalid key event: {e}"))?;
        self.page.execute(down).await?;
        tokio::time::sleep(delay).await;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key.to_string())
            .build()
            .map_err(|e| anyhow!("invalid key event: {e}"))?;
        self.page.execute(up).await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(ch.to_string())
                .build()
                .map_err(|e| anyhow!("invalid key event: {e}"))?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let ready = self.ready_state().await.unwrap_or_default();
            let satisfied = match state {
                LoadState::DomContentLoaded => ready == "interactive" || ready == "complete",
                LoadState::NetworkIdle => ready == "complete",
            };
            if satisfied {
                if state == LoadState::NetworkIdle {
                    // Give in-flight requests a settle window; CDP has no
                    // native network-idle signal.
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("timeout waiting for load state {state:?}");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn network_events(&self) -> Result<BoxStream<'static, NetworkObservation>> {
        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await?
            .map(|event| observation_from_request(event.as_ref()));
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await?
            .map(|event| observation_from_response(event.as_ref()));
        let failures = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await?
            .map(|event| observation_from_failure(event.as_ref()));
        Ok(futures::stream::select(requests, futures::stream::select(responses, failures)).boxed())
    }

    async fn screencast_frames(&self) -> Result<BoxStream<'static, ScreencastFrame>> {
        let frames = self
            .page
            .event_listener::<EventScreencastFrame>()
            .await?
            .map(|event| screencast_frame_from_event(event.as_ref()));
        Ok(frames.boxed())
    }

    async fn start_screencast(&self, opts: ScreencastOptions) -> Result<()> {
        let params = StartScreencastParams::builder()
            .format(StartScreencastFormat::Jpeg)
            .quality(i64::from(opts.quality))
            .max_width(i64::from(opts.max_width))
            .max_height(i64::from(opts.max_height))
            .every_nth_frame(1)
            .build();
        self.page
            .execute(params)
            .await
            .context("failed to start screencast")?;
        Ok(())
    }

    async fn ack_screencast_frame(&self, channel_id: i64) -> Result<()> {
        self.page
            .execute(ScreencastFrameAckParams::new(channel_id))
            .await?;
        Ok(())
    }

    async fn stop_screencast(&self) -> Result<()> {
        self.page.execute(StopScreencastParams::default()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // The owning browser process is torn down right after; closing the
        // target here is best-effort.
        let _ = self.evaluate("window.stop()").await;
        Ok(())
    }
}
