//! Capped network-event log.
//!
//! Written by the page's request/response/failure handlers and by the
//! action executor (synthetic events), read by the state builder. All reads
//! take snapshot copies so no lock is held across suspension points.

use crate::driver::{NetworkEventKind, NetworkObservation};
use crate::util;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Capacity applied when appending driver-observed events.
pub const NETWORK_LOG_CAP: usize = 500;

/// Capacity applied after appending synthetic action events.
pub const ACTION_EVENT_CAP: usize = 400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub id: String,
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub time: u64,
    #[serde(rename = "failureText", default, skip_serializing_if = "Option::is_none")]
    pub failure_text: Option<String>,
}

impl NetworkEvent {
    /// Normalize a driver observation into a ring entry. The id prefix
    /// encodes the subtype: `r_` request, `p_` response, `f_` failure.
    pub fn from_observation(observation: &NetworkObservation) -> Self {
        let prefix = match observation.kind {
            NetworkEventKind::Request => "r_",
            NetworkEventKind::Response => "p_",
            NetworkEventKind::Failure => "f_",
        };
        Self {
            id: format!("{prefix}{}", observation.id),
            url: observation.url.clone(),
            method: observation.method.clone().unwrap_or_default(),
            status: observation.status,
            event_type: observation.resource_type.clone(),
            time: util::now_ms(),
            failure_text: observation.failure_text.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct NetworkLog {
    events: Mutex<VecDeque<NetworkEvent>>,
}

impl NetworkLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, trimming the oldest entries down to `cap`.
    pub fn push(&self, event: NetworkEvent, cap: usize) {
        let mut events = self.events.lock();
        while events.len() >= cap.max(1) {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// The newest `n` events, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<NetworkEvent> {
        let events = self.events.lock();
        let skip = events.len().saturating_sub(n);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<NetworkEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> NetworkEvent {
        NetworkEvent {
            id: id.to_string(),
            url: "https://example.com".to_string(),
            method: "GET".to_string(),
            status: None,
            event_type: None,
            time: 0,
            failure_text: None,
        }
    }

    #[test]
    fn push_trims_to_cap() {
        let log = NetworkLog::new();
        for i in 0..10 {
            log.push(event(&format!("r_{i}")), 4);
        }
        assert_eq!(log.len(), 4);
        assert_eq!(log.last_n(1)[0].id, "r_9");
        assert_eq!(log.snapshot()[0].id, "r_6");
    }

    #[test]
    fn observation_prefixes_encode_subtype() {
        let base = NetworkObservation {
            kind: NetworkEventKind::Request,
            id: "42.1".to_string(),
            url: "https://example.com/a".to_string(),
            method: Some("POST".to_string()),
            status: None,
            resource_type: Some("document".to_string()),
            failure_text: None,
        };
        assert_eq!(NetworkEvent::from_observation(&base).id, "r_42.1");

        let response = NetworkObservation {
            kind: NetworkEventKind::Response,
            status: Some(200),
            ..base.clone()
        };
        assert_eq!(NetworkEvent::from_observation(&response).id, "p_42.1");

        let failure = NetworkObservation {
            kind: NetworkEventKind::Failure,
            failure_text: Some("net::ERR_FAILED".to_string()),
            ..base
        };
        let event = NetworkEvent::from_observation(&failure);
        assert_eq!(event.id, "f_42.1");
        assert_eq!(event.failure_text.as_deref(), Some("net::ERR_FAILED"));
    }

    #[test]
    fn serde_uses_wire_field_names() {
        let event = NetworkEvent {
            id: "f_1".to_string(),
            url: "https://x".to_string(),
            method: "GET".to_string(),
            status: None,
            event_type: Some("fetch".to_string()),
            time: 7,
            failure_text: Some("boom".to_string()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "fetch");
        assert_eq!(value["failureText"], "boom");
        assert!(value.get("status").is_none());
    }
}
