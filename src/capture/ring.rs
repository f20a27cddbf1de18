//! Bounded frame ring with drop-oldest eviction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Immutable reference to a captured frame artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRef {
    pub id: String,
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
    pub mime: String,
    pub checksum: String,
    pub path: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// FIFO ring of frame references. Pushing beyond capacity evicts the oldest
/// entry and increments the monotonic `dropped` counter. Eviction only
/// forgets the in-memory reference; the on-disk artifact stays behind for a
/// janitor to reclaim.
#[derive(Debug)]
pub struct FrameRing {
    frames: VecDeque<FrameRef>,
    capacity: usize,
    dropped: u64,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, frame: FrameRef) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
        }
        self.frames.push_back(frame);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Snapshot copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<FrameRef> {
        self.frames.iter().cloned().collect()
    }

    /// The newest `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<FrameRef> {
        let skip = self.frames.len().saturating_sub(n);
        self.frames.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<FrameRef> {
        self.frames.back().cloned()
    }

    /// Forget all entries. `dropped` stays monotonic.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str) -> FrameRef {
        FrameRef {
            id: id.to_string(),
            timestamp: 0,
            width: 100,
            height: 80,
            mime: "image/jpeg".to_string(),
            checksum: String::new(),
            path: String::new(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn eviction_drops_oldest_and_counts() {
        let capacity = 4;
        let mut ring = FrameRing::new(capacity);
        for i in 0..capacity + 3 {
            ring.push(frame(&format!("f{i}")));
        }
        assert_eq!(ring.depth(), capacity);
        assert_eq!(ring.dropped(), 3);
        assert_eq!(ring.latest().unwrap().id, "f6");
        assert_eq!(ring.snapshot().first().unwrap().id, "f3");
    }

    #[test]
    fn last_n_returns_tail_in_order() {
        let mut ring = FrameRing::new(8);
        for i in 0..5 {
            ring.push(frame(&format!("f{i}")));
        }
        let tail: Vec<String> = ring.last_n(2).into_iter().map(|f| f.id).collect();
        assert_eq!(tail, vec!["f3", "f4"]);
    }

    #[test]
    fn clear_keeps_dropped_monotonic() {
        let mut ring = FrameRing::new(1);
        ring.push(frame("a"));
        ring.push(frame("b"));
        assert_eq!(ring.dropped(), 1);
        ring.clear();
        assert_eq!(ring.depth(), 0);
        assert_eq!(ring.dropped(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let ring = FrameRing::new(0);
        assert_eq!(ring.capacity(), 1);
    }
}
