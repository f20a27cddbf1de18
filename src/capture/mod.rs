//! Visual-frame capture coordinator.
//!
//! The driver pushes screencast frames on its own schedule; this module
//! keeps a bounded ring of recent frames while guaranteeing that every
//! frame is acknowledged back to the driver — kept or dropped — so the
//! screencast never stalls. Throttling is adaptive: a visual-drift signal
//! opens a 2 s burst window with a tighter capture interval.

pub mod ring;

pub use ring::{FrameRef, FrameRing};

use crate::driver::{DriverPage, ScreencastFrame, ScreencastOptions};
use crate::metrics;
use crate::util;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Capture interval while a burst window is open.
const BURST_INTERVAL_MS: u64 = 125;
/// Capture interval outside burst windows.
const IDLE_INTERVAL_MS: u64 = 333;
/// How long a visual-drift signal keeps the burst window open.
const BURST_WINDOW_MS: u64 = 2000;

/// Resolve the effective frame-ring capacity for a session.
///
/// A requested maximum is clamped to [2, 20] (default 8). Profiles that are
/// not frames-only are further clamped to [3, 12].
pub fn resolve_frame_cap(request_max: Option<i64>, frames_only: bool) -> usize {
    let cap = request_max.map_or(8, |n| n.clamp(2, 20)) as usize;
    if frames_only {
        cap
    } else {
        cap.clamp(3, 12)
    }
}

/// Health counters for the frame queue, sampled into every state packet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueHealth {
    pub depth: usize,
    pub max: usize,
    pub dropped: u64,
    pub pending: usize,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub session_id: String,
    pub trace_id: String,
    pub quality: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub max_frames: usize,
    pub adaptive: bool,
    pub trace_dir: PathBuf,
}

pub struct CaptureCoordinator {
    config: CaptureConfig,
    ring: Mutex<FrameRing>,
    page: Mutex<Option<Arc<dyn DriverPage>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pending_acks: AtomicUsize,
    last_captured_ms: AtomicU64,
    burst_until_ms: AtomicU64,
    seq: AtomicU64,
    dropped_reported: AtomicU64,
    active: AtomicBool,
}

impl CaptureCoordinator {
    pub fn new(config: CaptureConfig) -> Arc<Self> {
        let capacity = config.max_frames;
        Arc::new(Self {
            config,
            ring: Mutex::new(FrameRing::new(capacity)),
            page: Mutex::new(None),
            task: Mutex::new(None),
            pending_acks: AtomicUsize::new(0),
            last_captured_ms: AtomicU64::new(0),
            burst_until_ms: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            dropped_reported: AtomicU64::new(0),
            active: AtomicBool::new(false),
        })
    }

    /// Subscribe to the page's screencast and spawn the consumer task.
    /// No-op when capture is disabled or already running.
    pub async fn start(self: &Arc<Self>, page: Arc<dyn DriverPage>) -> Result<()> {
        if !self.config.enabled || self.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut frames = page.screencast_frames().await?;
        page.start_screencast(ScreencastOptions {
            quality: self.config.quality,
            max_width: self.config.max_width,
            max_height: self.config.max_height,
        })
        .await?;

        *self.page.lock() = Some(page.clone());

        let coordinator = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                if !coordinator.active.load(Ordering::SeqCst) {
                    break;
                }
                coordinator.handle_frame(page.as_ref(), frame).await;
            }
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn handle_frame(&self, page: &dyn DriverPage, frame: ScreencastFrame) {
        self.pending_acks.fetch_add(1, Ordering::SeqCst);

        let now = util::now_ms();
        let interval = if now < self.burst_until_ms.load(Ordering::Relaxed) {
            BURST_INTERVAL_MS
        } else {
            IDLE_INTERVAL_MS
        };
        let last = self.last_captured_ms.load(Ordering::Relaxed);
        let keep = last == 0 || now.saturating_sub(last) >= interval;

        if keep {
            if let Some(data) = frame.data.as_deref() {
                if let Err(err) = self.persist_frame(data, &frame, now).await {
                    warn!(session = %self.config.session_id, "frame persist failed: {err}");
                }
            }
        }

        if let Some(channel_id) = frame.channel_id {
            if let Err(err) = page.ack_screencast_frame(channel_id).await {
                debug!("screencast ack failed: {err}");
            }
        }

        let _ = self
            .pending_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            });
    }

    async fn persist_frame(&self, data: &str, frame: &ScreencastFrame, now: u64) -> Result<()> {
        let started = Instant::now();
        let bytes = BASE64.decode(data)?;
        let checksum = util::sha1_hex(&bytes);

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}-{}-{}", self.config.session_id, now, seq);

        let frames_dir = self.config.trace_dir.join("frames");
        tokio::fs::create_dir_all(&frames_dir).await?;
        let path = frames_dir.join(format!("{id}.jpg"));
        tokio::fs::write(&path, &bytes).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("raw_bytes".to_string(), json!(bytes.len()));
        metadata.insert(
            "processing_ms".to_string(),
            json!(started.elapsed().as_millis() as u64),
        );
        metadata.insert("source_scale".to_string(), json!(frame.scale));

        let frame_ref = FrameRef {
            id,
            timestamp: now,
            width: frame.width,
            height: frame.height,
            mime: "image/jpeg".to_string(),
            checksum,
            path: path.to_string_lossy().into_owned(),
            metadata,
        };

        let dropped = {
            let mut ring = self.ring.lock();
            ring.push(frame_ref);
            ring.dropped()
        };
        self.last_captured_ms.store(now, Ordering::Relaxed);
        metrics::global().record_frame_captured();

        let reported = self.dropped_reported.swap(dropped, Ordering::Relaxed);
        if dropped > reported {
            metrics::global().record_frames_dropped(dropped - reported);
        }
        Ok(())
    }

    /// Open the burst window after actions that imply visual change.
    pub fn signal_visual_drift(&self) {
        if self.config.adaptive {
            self.burst_until_ms
                .store(util::now_ms() + BURST_WINDOW_MS, Ordering::Relaxed);
        }
    }

    /// Stop capturing. Disables the consumer before touching the driver so
    /// no further frames are pushed, then clears the ring and pending count.
    pub async fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) && !self.config.enabled {
            return;
        }
        let page = self.page.lock().take();
        if let Some(page) = page {
            if let Err(err) = page.stop_screencast().await {
                debug!("stop screencast failed: {err}");
            }
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.ring.lock().clear();
        self.pending_acks.store(0, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn queue_depth(&self) -> usize {
        self.ring.lock().depth()
    }

    pub fn queue_max(&self) -> usize {
        self.config.max_frames
    }

    pub fn dropped_frames(&self) -> u64 {
        self.ring.lock().dropped()
    }

    pub fn pending_acks(&self) -> usize {
        self.pending_acks.load(Ordering::SeqCst)
    }

    pub fn queue_snapshot(&self) -> Vec<FrameRef> {
        self.ring.lock().snapshot()
    }

    pub fn recent_frames(&self, n: usize) -> Vec<FrameRef> {
        self.ring.lock().last_n(n)
    }

    pub fn latest_frame(&self) -> Option<FrameRef> {
        self.ring.lock().latest()
    }

    pub fn queue_health(&self) -> QueueHealth {
        let ring = self.ring.lock();
        QueueHealth {
            depth: ring.depth(),
            max: ring.capacity(),
            dropped: ring.dropped(),
            pending: self.pending_acks.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockPage;

    fn test_config(dir: &std::path::Path, enabled: bool) -> CaptureConfig {
        CaptureConfig {
            enabled,
            session_id: "sess-1".to_string(),
            trace_id: "sess-1-123".to_string(),
            quality: 70,
            max_width: 1280,
            max_height: 720,
            max_frames: 4,
            adaptive: true,
            trace_dir: dir.to_path_buf(),
        }
    }

    fn jpeg_frame(channel: i64) -> ScreencastFrame {
        ScreencastFrame {
            channel_id: Some(channel),
            data: Some(BASE64.encode(b"not-really-a-jpeg")),
            width: 640,
            height: 480,
            scale: 1.0,
        }
    }

    #[test]
    fn frame_cap_resolution() {
        assert_eq!(resolve_frame_cap(None, false), 8);
        assert_eq!(resolve_frame_cap(None, true), 8);
        assert_eq!(resolve_frame_cap(Some(1), true), 2);
        assert_eq!(resolve_frame_cap(Some(64), true), 20);
        assert_eq!(resolve_frame_cap(Some(2), false), 3);
        assert_eq!(resolve_frame_cap(Some(18), false), 12);
        assert_eq!(resolve_frame_cap(Some(10), false), 10);
    }

    #[tokio::test]
    async fn every_frame_is_acked_even_when_throttled() {
        let tmp = tempfile::tempdir().unwrap();
        let page = Arc::new(MockPage::default());
        let coordinator = CaptureCoordinator::new(test_config(tmp.path(), true));
        coordinator.start(page.clone()).await.unwrap();

        for i in 0..5 {
            page.push_frame(jpeg_frame(i));
        }
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert_eq!(page.acked_frames.lock().len(), 5);
        // Frames arrive within one throttle interval, so only the first is kept.
        assert_eq!(coordinator.queue_depth(), 1);
        assert_eq!(coordinator.pending_acks(), 0);

        coordinator.stop().await;
    }

    #[tokio::test]
    async fn dataless_frames_are_acked_but_not_stored() {
        let tmp = tempfile::tempdir().unwrap();
        let page = Arc::new(MockPage::default());
        let coordinator = CaptureCoordinator::new(test_config(tmp.path(), true));
        coordinator.start(page.clone()).await.unwrap();

        page.push_frame(ScreencastFrame {
            channel_id: Some(9),
            data: None,
            ..ScreencastFrame::default()
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(page.acked_frames.lock().as_slice(), &[9]);
        assert_eq!(coordinator.queue_depth(), 0);
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn kept_frame_lands_on_disk_with_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        let page = Arc::new(MockPage::default());
        let coordinator = CaptureCoordinator::new(test_config(tmp.path(), true));
        coordinator.start(page.clone()).await.unwrap();

        page.push_frame(jpeg_frame(1));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let frame = coordinator.latest_frame().expect("frame kept");
        assert_eq!(frame.mime, "image/jpeg");
        assert_eq!(frame.checksum, crate::util::sha1_hex(b"not-really-a-jpeg"));
        assert!(std::path::Path::new(&frame.path).exists());
        assert!(frame.id.starts_with("sess-1-"));
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn disabled_coordinator_never_subscribes() {
        let tmp = tempfile::tempdir().unwrap();
        let page = Arc::new(MockPage::default());
        let coordinator = CaptureCoordinator::new(test_config(tmp.path(), false));
        coordinator.start(page.clone()).await.unwrap();

        assert!(!coordinator.is_active());
        assert!(!page.screencast_active.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_clears_ring_and_halts_capture() {
        let tmp = tempfile::tempdir().unwrap();
        let page = Arc::new(MockPage::default());
        let coordinator = CaptureCoordinator::new(test_config(tmp.path(), true));
        coordinator.start(page.clone()).await.unwrap();

        page.push_frame(jpeg_frame(1));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(coordinator.queue_depth(), 1);

        coordinator.stop().await;
        assert_eq!(coordinator.queue_depth(), 0);
        assert_eq!(coordinator.pending_acks(), 0);
        assert!(!coordinator.is_active());

        page.push_frame(jpeg_frame(2));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(coordinator.queue_depth(), 0);
    }

    #[tokio::test]
    async fn visual_drift_opens_burst_window() {
        let tmp = tempfile::tempdir().unwrap();
        let coordinator = CaptureCoordinator::new(test_config(tmp.path(), true));
        assert_eq!(coordinator.burst_until_ms.load(Ordering::Relaxed), 0);
        coordinator.signal_visual_drift();
        assert!(coordinator.burst_until_ms.load(Ordering::Relaxed) > crate::util::now_ms());
    }
}
