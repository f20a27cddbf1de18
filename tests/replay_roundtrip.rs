//! Replay store round-trip through the public API.

use serde_json::json;
use webagentd::replay::{ReplayEvent, ReplayStore};

fn event(index: u64) -> ReplayEvent {
    ReplayEvent {
        event_type: if index == 1 { "create" } else { "step" }.to_string(),
        index,
        at: 1_700_000_000_000 + index,
        payload: json!({"session_id": "sess-42", "n": index}),
    }
}

#[test]
fn append_five_then_filter_middle_three() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReplayStore::new(tmp.path().join("traces"));

    for i in 1..=5 {
        store.append("trace-a", &event(i)).unwrap();
    }

    let middle = store.filter("trace-a", Some(2), Some(4)).unwrap();
    let indices: Vec<u64> = middle.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![2, 3, 4]);
}

#[test]
fn manifest_reconstruction_recovers_session_and_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReplayStore::new(tmp.path().join("traces"));
    for i in 1..=3 {
        store.append("trace-b", &event(i)).unwrap();
    }

    let manifest = store.load("trace-b").unwrap();
    assert_eq!(manifest.trace_id, "trace-b");
    assert_eq!(manifest.created_at, 1_700_000_000_001);
    assert_eq!(manifest.session_id.as_deref(), Some("sess-42"));
    assert_eq!(manifest.events.len(), 3);
}

#[test]
fn index_file_uses_wire_key_names() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReplayStore::new(tmp.path().join("traces"));
    let events = vec![event(1), event(2)];
    store.persist_trace_index("trace-c", &events).unwrap();

    let raw = std::fs::read_to_string(store.index_path("trace-c")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["traceId"], "trace-c");
    assert_eq!(value["total"], 2);
    assert!(value["updated_at"].as_u64().unwrap() > 0);
}

#[test]
fn events_survive_interleaved_garbage() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReplayStore::new(tmp.path().join("traces"));
    store.append("trace-d", &event(1)).unwrap();

    let path = store.trace_path("trace-d");
    let mut raw = std::fs::read_to_string(&path).unwrap();
    raw.push_str("garbage line\n\n{\"also\": \"wrong shape\"}\n");
    std::fs::write(&path, raw).unwrap();
    store.append("trace-d", &event(2)).unwrap();

    let manifest = store.load("trace-d").unwrap();
    let indices: Vec<u64> = manifest.events.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn cleanup_then_load_yields_fresh_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ReplayStore::new(tmp.path().join("traces"));
    store.append("trace-e", &event(1)).unwrap();
    store.persist_trace_index("trace-e", &[event(1)]).unwrap();

    store.cleanup("trace-e");
    let manifest = store.load("trace-e").unwrap();
    assert!(manifest.events.is_empty());
    assert!(manifest.session_id.is_none());
}
