//! Append-only replay store.
//!
//! One line-delimited JSON file per trace plus a small JSON index. Loading
//! is defensive: malformed lines are dropped with a warning instead of
//! failing the whole manifest. Replay means audit-reconstruction of the
//! observed events, not re-execution.

use crate::util;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub index: u64,
    pub at: u64,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceManifest {
    pub trace_id: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub events: Vec<ReplayEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceIndex {
    #[serde(rename = "traceId")]
    pub trace_id: String,
    pub total: usize,
    pub updated_at: u64,
}

pub struct ReplayStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl ReplayStore {
    /// The root is resolved once; every trace lives directly under it.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replace every character outside `[A-Za-z0-9._-]` so a trace id can
    /// never escape the traces root.
    fn sanitize(trace_id: &str) -> String {
        trace_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn trace_path(&self, trace_id: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", Self::sanitize(trace_id)))
    }

    pub fn index_path(&self, trace_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.index.json", Self::sanitize(trace_id)))
    }

    /// Per-trace artifact directory (frame JPEGs live under `frames/`).
    pub fn trace_dir(&self, trace_id: &str) -> PathBuf {
        self.root.join(Self::sanitize(trace_id))
    }

    pub fn append(&self, trace_id: &str, event: &ReplayEvent) -> Result<()> {
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create traces root {}", self.root.display()))?;
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.trace_path(trace_id))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Reconstruct the manifest for a trace. A missing file yields an empty
    /// manifest rather than an error.
    pub fn load(&self, trace_id: &str) -> Result<TraceManifest> {
        let path = self.trace_path(trace_id);
        if !path.exists() {
            return Ok(TraceManifest {
                trace_id: trace_id.to_string(),
                created_at: util::now_ms(),
                session_id: None,
                events: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&path)?;
        let mut events = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ReplayEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(trace = trace_id, "skipping malformed replay line: {err}"),
            }
        }

        let created_at = events.first().map_or_else(util::now_ms, |event| event.at);
        let session_id = events
            .iter()
            .find(|event| event.event_type == "create")
            .and_then(|event| event.payload.get("session_id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(TraceManifest {
            trace_id: trace_id.to_string(),
            created_at,
            session_id,
            events,
        })
    }

    /// Events with `start ≤ index ≤ end` (either bound optional), sorted by
    /// index.
    pub fn filter(
        &self,
        trace_id: &str,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<Vec<ReplayEvent>> {
        let manifest = self.load(trace_id)?;
        let mut events: Vec<ReplayEvent> = manifest
            .events
            .into_iter()
            .filter(|event| {
                start.is_none_or(|s| event.index >= s) && end.is_none_or(|e| event.index <= e)
            })
            .collect();
        events.sort_by_key(|event| event.index);
        Ok(events)
    }

    pub fn persist_trace_index(&self, trace_id: &str, events: &[ReplayEvent]) -> Result<()> {
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.root)?;
        let index = TraceIndex {
            trace_id: trace_id.to_string(),
            total: events.len(),
            updated_at: util::now_ms(),
        };
        fs::write(
            self.index_path(trace_id),
            serde_json::to_string_pretty(&index)?,
        )?;
        Ok(())
    }

    /// Remove the trace log and its index, best-effort.
    pub fn cleanup(&self, trace_id: &str) {
        let _ = fs::remove_file(self.trace_path(trace_id));
        let _ = fs::remove_file(self.index_path(trace_id));
    }

    /// Janitor pass for a trace's frame artifacts, best-effort.
    pub fn remove_artifacts(&self, trace_id: &str) {
        let _ = fs::remove_dir_all(self.trace_dir(trace_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, ReplayStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReplayStore::new(tmp.path().join("traces"));
        (tmp, store)
    }

    fn event(event_type: &str, index: u64) -> ReplayEvent {
        ReplayEvent {
            event_type: event_type.to_string(),
            index,
            at: 1000 + index,
            payload: json!({"session_id": "sess-1"}),
        }
    }

    #[test]
    fn append_then_load_round_trips() {
        let (_tmp, store) = store();
        store.append("trace-1", &event("create", 1)).unwrap();
        store.append("trace-1", &event("step", 2)).unwrap();

        let manifest = store.load("trace-1").unwrap();
        assert_eq!(manifest.events.len(), 2);
        assert_eq!(manifest.created_at, 1001);
        assert_eq!(manifest.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn missing_trace_yields_empty_manifest() {
        let (_tmp, store) = store();
        let manifest = store.load("nope").unwrap();
        assert_eq!(manifest.trace_id, "nope");
        assert!(manifest.events.is_empty());
        assert!(manifest.session_id.is_none());
    }

    #[test]
    fn malformed_lines_are_dropped() {
        let (_tmp, store) = store();
        store.append("trace-1", &event("create", 1)).unwrap();
        let path = store.trace_path("trace-1");
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{not json\n");
        fs::write(&path, raw).unwrap();
        store.append("trace-1", &event("step", 2)).unwrap();

        let manifest = store.load("trace-1").unwrap();
        assert_eq!(manifest.events.len(), 2);
    }

    #[test]
    fn filter_keeps_inclusive_range_sorted() {
        let (_tmp, store) = store();
        for i in 1..=5 {
            store.append("trace-1", &event("step", i)).unwrap();
        }
        let middle = store.filter("trace-1", Some(2), Some(4)).unwrap();
        let indices: Vec<u64> = middle.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);

        let open_start = store.filter("trace-1", None, Some(2)).unwrap();
        assert_eq!(open_start.len(), 2);
        let open_end = store.filter("trace-1", Some(4), None).unwrap();
        assert_eq!(open_end.len(), 2);
    }

    #[test]
    fn index_records_total() {
        let (_tmp, store) = store();
        let events = vec![event("create", 1), event("step", 2)];
        store.persist_trace_index("trace-1", &events).unwrap();

        let raw = fs::read_to_string(store.index_path("trace-1")).unwrap();
        let index: TraceIndex = serde_json::from_str(&raw).unwrap();
        assert_eq!(index.trace_id, "trace-1");
        assert_eq!(index.total, 2);
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("traceId").is_some());
    }

    #[test]
    fn cleanup_removes_log_and_index() {
        let (_tmp, store) = store();
        store.append("trace-1", &event("create", 1)).unwrap();
        store
            .persist_trace_index("trace-1", &[event("create", 1)])
            .unwrap();
        store.cleanup("trace-1");
        assert!(!store.trace_path("trace-1").exists());
        assert!(!store.index_path("trace-1").exists());
        // Cleanup of an unknown trace is a no-op.
        store.cleanup("missing");
    }

    #[test]
    fn trace_ids_are_sanitized() {
        let (_tmp, store) = store();
        let path = store.trace_path("../evil/id");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, ".._evil_id.jsonl");
        assert_eq!(path.parent().unwrap(), store.root());
    }
}
