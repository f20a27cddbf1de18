//! State token determinism and frame-ring semantics through public APIs.

use webagentd::capture::{FrameRef, FrameRing};
use webagentd::state::{state_token, DomSummary};

fn frame(id: &str) -> FrameRef {
    FrameRef {
        id: id.to_string(),
        timestamp: 1,
        width: 640,
        height: 480,
        mime: "image/jpeg".to_string(),
        checksum: "c".to_string(),
        path: format!("/tmp/{id}.jpg"),
        metadata: serde_json::Map::new(),
    }
}

#[test]
fn identical_inputs_yield_identical_tokens() {
    let dom = DomSummary {
        interactive_count: 5,
        buttons: 2,
        text_inputs: 1,
        links: 2,
        iframes: 0,
        canvas_nodes: 0,
        top_elements: Vec::new(),
    };
    let a = state_token("https://example.com", "Example", Some(&dom), 7, 3);
    let b = state_token("https://example.com", "Example", Some(&dom), 7, 3);
    assert_eq!(a, b);
    assert_eq!(a.len(), 40);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn any_identity_field_changes_the_token() {
    let dom = DomSummary::default();
    let base = state_token("https://example.com", "T", Some(&dom), 1, 1);
    assert_ne!(base, state_token("https://example.com/x", "T", Some(&dom), 1, 1));
    assert_ne!(base, state_token("https://example.com", "U", Some(&dom), 1, 1));
    assert_ne!(base, state_token("https://example.com", "T", Some(&dom), 2, 1));
    assert_ne!(base, state_token("https://example.com", "T", Some(&dom), 1, 2));
    assert_ne!(base, state_token("https://example.com", "T", None, 1, 1));
}

#[test]
fn ring_eviction_keeps_tail_and_counts_drops() {
    let capacity = 6;
    let mut ring = FrameRing::new(capacity);
    for i in 0..capacity + 3 {
        ring.push(frame(&format!("f{i}")));
    }
    assert_eq!(ring.depth(), capacity);
    assert_eq!(ring.dropped(), 3);
    assert_eq!(ring.latest().unwrap().id, format!("f{}", capacity + 2));

    let ids: Vec<String> = ring.snapshot().into_iter().map(|f| f.id).collect();
    assert_eq!(ids.first().unwrap(), "f3");
    assert_eq!(ids.len(), capacity);
}
