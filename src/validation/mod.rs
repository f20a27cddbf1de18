//! Request validation for the tool surface.
//!
//! Validation happens before any browser work. Each check appends a string
//! error code to a [`ValidationReport`]; the caller rejects the request when
//! `ok` is false and surfaces the codes verbatim.

use crate::security;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_URL_LEN: usize = 2048;

const VIEWPORT_WIDTH_RANGE: (i64, i64) = (320, 7680);
const VIEWPORT_HEIGHT_RANGE: (i64, i64) = (200, 4320);
const MAX_STEPS_RANGE: (i64, i64) = (1, 50_000);
const MIN_DURATION_MS: i64 = 1000;
const TIMEOUT_RANGE: (i64, i64) = (50, 120_000);
const ACTION_LIMIT_RANGE: (i64, i64) = (1, 20);
const MAX_FRAMES_RANGE: (i64, i64) = (1, 64);

pub const KNOWN_ACTIONS: &[&str] = &[
    "navigate", "click", "hover", "type", "press", "scroll", "drag", "wait", "wait_for",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn passed() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, code: &str, message: impl Into<String>) {
        self.ok = false;
        self.errors.push(ValidationIssue {
            code: code.to_string(),
            message: message.into(),
        });
    }

    pub fn codes(&self) -> Vec<String> {
        self.errors.iter().map(|issue| issue.code.clone()).collect()
    }
}

/// Validate a URL against scheme rules and the host allow/deny lists.
pub fn validate_url(raw: &str, allowlist: &[String], denylist: &[String]) -> ValidationReport {
    let mut report = ValidationReport::passed();
    let url = raw.trim();

    if url.is_empty() || url.len() > MAX_URL_LEN || url.chars().any(char::is_whitespace) {
        report.push("INVALID_URL", "url must be a non-empty string of at most 2048 chars");
        return report;
    }

    let Some(scheme) = security::extract_scheme(url) else {
        report.push("INVALID_URL", "url has no scheme");
        return report;
    };

    if security::DISALLOWED_SCHEMES.contains(&scheme.as_str()) {
        report.push("DISALLOWED_SCHEME", format!("scheme '{scheme}' is not permitted"));
        return report;
    }

    if !security::ALLOWED_SCHEMES.contains(&scheme.as_str()) {
        report.push("INVALID_SCHEME", format!("scheme '{scheme}' is not http or https"));
        return report;
    }

    let Some(host) = security::extract_host(url) else {
        report.push("INVALID_URL", "url must include a host");
        return report;
    };

    if security::host_in_list(&host, denylist) {
        report.push("DOMAIN_DENIED", format!("host '{host}' is denied"));
        return report;
    }

    if !allowlist.is_empty() && !security::host_in_list(&host, allowlist) {
        report.push("DOMAIN_NOT_ALLOWED", format!("host '{host}' is not allowlisted"));
    }

    report
}

fn str_field<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn nonempty_str_field<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    str_field(args, key).map(str::trim).filter(|s| !s.is_empty())
}

fn int_field(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

fn num_field(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

fn has_coordinates(args: &Value) -> bool {
    num_field(args, "x").is_some() && num_field(args, "y").is_some()
}

fn check_int_range(
    report: &mut ValidationReport,
    args: &Value,
    key: &str,
    range: (i64, i64),
    code: &str,
) {
    if let Some(raw) = args.get(key) {
        match raw.as_i64() {
            Some(value) if (range.0..=range.1).contains(&value) => {}
            _ => report.push(
                code,
                format!("{key} must be an integer in [{}, {}]", range.0, range.1),
            ),
        }
    }
}

/// Validate the argument map of a `web_agent_step` call.
pub fn validate_action(args: &Value) -> ValidationReport {
    let mut report = ValidationReport::passed();

    if nonempty_str_field(args, "session_id").is_none() {
        report.push("INVALID_TARGET", "session_id is required");
    }

    let action = match nonempty_str_field(args, "action") {
        Some(action) if KNOWN_ACTIONS.contains(&action) => action,
        Some(action) => {
            report.push("INVALID_ACTION", format!("unknown action '{action}'"));
            return report;
        }
        None => {
            report.push("INVALID_ACTION", "action is required");
            return report;
        }
    };

    if let Some(selector) = str_field(args, "selector") {
        if selector.trim().is_empty() {
            report.push("INVALID_SELECTOR", "selector must not be blank");
        }
    }

    match action {
        "navigate" => {
            if nonempty_str_field(args, "url").is_none() {
                report.push("MISSING_URL", "navigate requires url");
            }
        }
        "type" => {
            if str_field(args, "text").is_none() {
                report.push("MISSING_TEXT", "type requires text");
            }
            if nonempty_str_field(args, "selector").is_none() && !has_coordinates(args) {
                report.push("MISSING_TARGET", "type requires a selector or coordinates");
            }
        }
        "press" => {
            if nonempty_str_field(args, "key").is_none() {
                report.push("MISSING_KEY", "press requires key");
            }
        }
        "click" | "hover" => {
            if nonempty_str_field(args, "selector").is_none() && !has_coordinates(args) {
                report.push(
                    "MISSING_TARGET",
                    format!("{action} requires a selector or coordinates"),
                );
            }
        }
        "drag" => {
            if !has_coordinates(args)
                || num_field(args, "delta_x").is_none()
                || num_field(args, "delta_y").is_none()
            {
                report.push("MISSING_TARGET", "drag requires x, y, delta_x and delta_y");
            }
        }
        "wait_for" => {
            if nonempty_str_field(args, "target").is_none()
                && nonempty_str_field(args, "selector").is_none()
            {
                report.push("MISSING_TARGET", "wait_for requires a target");
            }
        }
        _ => {}
    }

    check_int_range(&mut report, args, "timeout_ms", TIMEOUT_RANGE, "INVALID_TIMEOUT");
    check_int_range(
        &mut report,
        args,
        "max_actions_per_step",
        ACTION_LIMIT_RANGE,
        "INVALID_ACTION_LIMIT",
    );

    report
}

/// Validate the argument map of a `web_agent_session_create` call.
pub fn validate_create(args: &Value, allowlist: &[String], denylist: &[String]) -> ValidationReport {
    let mut report = ValidationReport::passed();

    match nonempty_str_field(args, "target_url") {
        Some(url) => {
            let url_report = validate_url(url, allowlist, denylist);
            if !url_report.ok {
                report.ok = false;
                report.errors.extend(url_report.errors);
            }
        }
        None => report.push("INVALID_TARGET", "target_url is required"),
    }

    if let Some(viewport) = args.get("viewport") {
        let width = int_field(viewport, "width");
        let height = int_field(viewport, "height");
        let width_ok =
            width.is_some_and(|w| (VIEWPORT_WIDTH_RANGE.0..=VIEWPORT_WIDTH_RANGE.1).contains(&w));
        let height_ok = height
            .is_some_and(|h| (VIEWPORT_HEIGHT_RANGE.0..=VIEWPORT_HEIGHT_RANGE.1).contains(&h));
        if !width_ok || !height_ok {
            report.push(
                "INVALID_VIEWPORT",
                "viewport width must be in [320, 7680] and height in [200, 4320]",
            );
        }
    }

    check_int_range(&mut report, args, "max_steps", MAX_STEPS_RANGE, "INVALID_MAX_STEPS");

    if let Some(raw) = args.get("max_duration_ms") {
        match raw.as_i64() {
            Some(value) if value >= MIN_DURATION_MS => {}
            _ => report.push("INVALID_DURATION", "max_duration_ms must be at least 1000"),
        }
    }

    if let Some(capture) = args.get("capture") {
        if let Some(frames) = int_field(capture, "max_frames") {
            if !(MAX_FRAMES_RANGE.0..=MAX_FRAMES_RANGE.1).contains(&frames) {
                report.push("INVALID_ACTION_LIMIT", "capture.max_frames must be in [1, 64]");
            }
        }
    }

    report
}

/// Validate the argument map of a `web_agent_snapshot` call.
pub fn validate_snapshot(args: &Value) -> ValidationReport {
    let mut report = ValidationReport::passed();
    if nonempty_str_field(args, "session_id").is_none() {
        report.push("INVALID_TARGET", "session_id is required");
    }
    if let Some(frames) = int_field(args, "max_frames") {
        if !(MAX_FRAMES_RANGE.0..=MAX_FRAMES_RANGE.1).contains(&frames) {
            report.push("INVALID_ACTION_LIMIT", "max_frames must be in [1, 64]");
        }
    }
    report
}

/// Validate the argument map of a `web_agent_session_stop` call.
pub fn validate_stop(args: &Value) -> ValidationReport {
    let mut report = ValidationReport::passed();
    if nonempty_str_field(args, "session_id").is_none() {
        report.push("INVALID_TARGET", "session_id is required");
    }
    report
}

/// Validate the argument map of a `web_agent_replay` call.
pub fn validate_replay(args: &Value) -> ValidationReport {
    let mut report = ValidationReport::passed();
    if nonempty_str_field(args, "trace_id").is_none() {
        report.push("INVALID_TARGET", "trace_id is required");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn click_with_coordinates_passes() {
        let report = validate_action(&json!({
            "session_id": "s1",
            "action": "click",
            "x": 20,
            "y": 15,
        }));
        assert!(report.ok);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn type_without_text_fails_with_missing_text() {
        let report = validate_action(&json!({
            "session_id": "s1",
            "action": "type",
            "selector": "#q",
        }));
        assert!(!report.ok);
        assert!(report.codes().contains(&"MISSING_TEXT".to_string()));
    }

    #[test]
    fn ftp_scheme_is_invalid_scheme() {
        let report = validate_url("ftp://example.com", &[], &[]);
        assert!(!report.ok);
        assert_eq!(report.errors[0].code, "INVALID_SCHEME");
    }

    #[test]
    fn file_scheme_is_disallowed() {
        let report = validate_url("file:///etc/passwd", &[], &[]);
        assert!(!report.ok);
        assert_eq!(report.errors[0].code, "DISALLOWED_SCHEME");
    }

    #[test]
    fn allowlist_covers_subdomains() {
        let allow = vec!["example.com".to_string()];
        assert!(validate_url("https://example.com", &allow, &[]).ok);
        assert!(validate_url("https://api.example.com/x", &allow, &[]).ok);
        let miss = validate_url("https://other.org", &allow, &[]);
        assert_eq!(miss.errors[0].code, "DOMAIN_NOT_ALLOWED");
    }

    #[test]
    fn denylist_wins_over_allowlist() {
        let allow = vec!["*".to_string()];
        let deny = vec!["example.com".to_string()];
        let report = validate_url("https://sub.example.com", &allow, &deny);
        assert_eq!(report.errors[0].code, "DOMAIN_DENIED");
    }

    #[test]
    fn unknown_action_is_rejected() {
        let report = validate_action(&json!({"session_id": "s1", "action": "teleport"}));
        assert_eq!(report.errors[0].code, "INVALID_ACTION");
    }

    #[test]
    fn press_without_key_fails() {
        let report = validate_action(&json!({"session_id": "s1", "action": "press"}));
        assert!(report.codes().contains(&"MISSING_KEY".to_string()));
    }

    #[test]
    fn navigate_without_url_fails() {
        let report = validate_action(&json!({"session_id": "s1", "action": "navigate"}));
        assert!(report.codes().contains(&"MISSING_URL".to_string()));
    }

    #[test]
    fn wait_for_without_target_fails() {
        let report = validate_action(&json!({"session_id": "s1", "action": "wait_for"}));
        assert!(report.codes().contains(&"MISSING_TARGET".to_string()));
    }

    #[test]
    fn timeout_out_of_range_fails() {
        let report = validate_action(&json!({
            "session_id": "s1",
            "action": "wait",
            "timeout_ms": 10,
        }));
        assert!(report.codes().contains(&"INVALID_TIMEOUT".to_string()));
    }

    #[test]
    fn action_limit_out_of_range_fails() {
        let report = validate_action(&json!({
            "session_id": "s1",
            "action": "click",
            "x": 1,
            "y": 1,
            "max_actions_per_step": 50,
        }));
        assert!(report.codes().contains(&"INVALID_ACTION_LIMIT".to_string()));
    }

    #[test]
    fn blank_selector_is_invalid() {
        let report = validate_action(&json!({
            "session_id": "s1",
            "action": "click",
            "selector": "  ",
            "x": 1,
            "y": 1,
        }));
        assert!(report.codes().contains(&"INVALID_SELECTOR".to_string()));
    }

    #[test]
    fn create_requires_target_url() {
        let report = validate_create(&json!({}), &[], &[]);
        assert_eq!(report.errors[0].code, "INVALID_TARGET");
    }

    #[test]
    fn create_checks_viewport_and_budgets() {
        let report = validate_create(
            &json!({
                "target_url": "https://example.com",
                "viewport": {"width": 100, "height": 4000},
                "max_steps": 0,
                "max_duration_ms": 10,
            }),
            &[],
            &[],
        );
        let codes = report.codes();
        assert!(codes.contains(&"INVALID_VIEWPORT".to_string()));
        assert!(codes.contains(&"INVALID_MAX_STEPS".to_string()));
        assert!(codes.contains(&"INVALID_DURATION".to_string()));
    }

    #[test]
    fn oversized_url_is_invalid() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LEN));
        let report = validate_url(&url, &[], &[]);
        assert_eq!(report.errors[0].code, "INVALID_URL");
    }
}
