//! Process-level metrics aggregator.
//!
//! Counters are plain atomics updated from the session runtime and exposed
//! as a JSON snapshot through the REST transport and the `config` CLI
//! command. All counters are monotonic for the life of the process.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

#[derive(Debug, Default)]
pub struct ServerMetrics {
    sessions_created: AtomicU64,
    sessions_stopped: AtomicU64,
    sessions_evicted: AtomicU64,
    steps_total: AtomicU64,
    actions_failed: AtomicU64,
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    step_latency_total_ms: AtomicU64,
}

static METRICS: LazyLock<ServerMetrics> = LazyLock::new(ServerMetrics::default);

/// Global metrics handle.
pub fn global() -> &'static ServerMetrics {
    &METRICS
}

impl ServerMetrics {
    pub fn record_session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_stopped(&self) {
        self.sessions_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_evicted(&self) {
        self.sessions_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step(&self, latency_ms: u64) {
        self.steps_total.fetch_add(1, Ordering::Relaxed);
        self.step_latency_total_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_action_failure(&self) {
        self.actions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frames_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn steps_total(&self) -> u64 {
        self.steps_total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Value {
        let steps = self.steps_total.load(Ordering::Relaxed);
        let latency_total = self.step_latency_total_ms.load(Ordering::Relaxed);
        let mean_latency = if steps == 0 { 0 } else { latency_total / steps };

        json!({
            "sessions_created": self.sessions_created.load(Ordering::Relaxed),
            "sessions_stopped": self.sessions_stopped.load(Ordering::Relaxed),
            "sessions_evicted": self.sessions_evicted.load(Ordering::Relaxed),
            "steps_total": steps,
            "actions_failed": self.actions_failed.load(Ordering::Relaxed),
            "frames_captured": self.frames_captured.load(Ordering::Relaxed),
            "frames_dropped": self.frames_dropped.load(Ordering::Relaxed),
            "step_latency_mean_ms": mean_latency,
        })
    }
}
