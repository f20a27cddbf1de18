//! Validation boundary tests: exact error codes per trigger condition.

use serde_json::json;
use webagentd::security::mask_secret;
use webagentd::validation::{validate_action, validate_create, validate_url};

fn codes(report: &webagentd::validation::ValidationReport) -> Vec<String> {
    report.codes()
}

#[test]
fn click_with_coordinates_is_valid() {
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
fn type_with_selector_but_no_text_is_missing_text() {
    let report = validate_action(&json!({
        "session_id": "s1",
        "action": "type",
        "selector": "#q",
    }));
    assert!(!report.ok);
    assert!(codes(&report).contains(&"MISSING_TEXT".to_string()));
}

#[test]
fn ftp_url_fails_with_invalid_scheme_first() {
    let report = validate_url("ftp://example.com", &[], &[]);
    assert!(!report.ok);
    assert_eq!(report.errors[0].code, "INVALID_SCHEME");
}

#[test]
fn secret_masking_shapes() {
    assert_eq!(mask_secret(Some("supersecret")), "sup********");
    assert_eq!(mask_secret(Some("abc")), "***");
    assert_eq!(mask_secret(None), "");
}

#[test]
fn action_error_codes_per_trigger() {
    let cases: Vec<(serde_json::Value, &str)> = vec![
        (json!({"session_id": "s", "action": "navigate"}), "MISSING_URL"),
        (json!({"session_id": "s", "action": "type", "selector": "#q"}), "MISSING_TEXT"),
        (json!({"session_id": "s", "action": "press"}), "MISSING_KEY"),
        (json!({"session_id": "s", "action": "click"}), "MISSING_TARGET"),
        (json!({"session_id": "s", "action": "hover"}), "MISSING_TARGET"),
        (json!({"session_id": "s", "action": "drag", "x": 1, "y": 1}), "MISSING_TARGET"),
        (json!({"session_id": "s", "action": "wait_for"}), "MISSING_TARGET"),
        (json!({"session_id": "s", "action": "warp"}), "INVALID_ACTION"),
        (
            json!({"session_id": "s", "action": "click", "selector": " ", "x": 1, "y": 1}),
            "INVALID_SELECTOR",
        ),
        (
            json!({"session_id": "s", "action": "wait", "timeout_ms": 5}),
            "INVALID_TIMEOUT",
        ),
        (
            json!({"session_id": "s", "action": "wait", "timeout_ms": 500000}),
            "INVALID_TIMEOUT",
        ),
        (
            json!({"session_id": "s", "action": "click", "x": 1, "y": 1, "max_actions_per_step": 0}),
            "INVALID_ACTION_LIMIT",
        ),
        (
            json!({"session_id": "s", "action": "click", "x": 1, "y": 1, "max_actions_per_step": 25}),
            "INVALID_ACTION_LIMIT",
        ),
        (json!({"action": "click", "x": 1, "y": 1}), "INVALID_TARGET"),
    ];

    for (args, expected) in cases {
        let report = validate_action(&args);
        assert!(!report.ok, "{args} should fail");
        assert!(
            codes(&report).contains(&expected.to_string()),
            "{args} should include {expected}, got {:?}",
            codes(&report)
        );
    }
}

#[test]
fn valid_actions_across_the_dispatch_table() {
    let cases = vec![
        json!({"session_id": "s", "action": "navigate", "url": "https://example.com"}),
        json!({"session_id": "s", "action": "click", "selector": "#a"}),
        json!({"session_id": "s", "action": "hover", "x": 4, "y": 5}),
        json!({"session_id": "s", "action": "type", "text": "hi", "selector": "#q"}),
        json!({"session_id": "s", "action": "press", "key": "Enter"}),
        json!({"session_id": "s", "action": "scroll", "delta_y": 100}),
        json!({"session_id": "s", "action": "drag", "x": 1, "y": 1, "delta_x": 5, "delta_y": 5}),
        json!({"session_id": "s", "action": "wait"}),
        json!({"session_id": "s", "action": "wait_for", "target": "networkidle"}),
    ];
    for args in cases {
        let report = validate_action(&args);
        assert!(report.ok, "{args} should pass, got {:?}", codes(&report));
    }
}

#[test]
fn url_error_codes_per_trigger() {
    let allow = vec!["example.com".to_string()];
    let deny = vec!["blocked.org".to_string()];

    let cases: Vec<(&str, &str)> = vec![
        ("", "INVALID_URL"),
        ("not a url", "INVALID_URL"),
        ("nohost", "INVALID_URL"),
        ("ftp://example.com", "INVALID_SCHEME"),
        ("file:///etc/hosts", "DISALLOWED_SCHEME"),
        ("chrome://settings", "DISALLOWED_SCHEME"),
        ("about:blank", "DISALLOWED_SCHEME"),
        ("https://other.net", "DOMAIN_NOT_ALLOWED"),
        ("https://sub.blocked.org/x", "DOMAIN_DENIED"),
    ];
    for (url, expected) in cases {
        let report = validate_url(url, &allow, &deny);
        assert!(!report.ok, "{url} should fail");
        assert_eq!(report.errors[0].code, expected, "for {url}");
    }

    assert!(validate_url("https://example.com/a", &allow, &deny).ok);
    assert!(validate_url("http://api.example.com", &allow, &deny).ok);
}

#[test]
fn allowlist_entry_matches_exact_host_and_subdomains() {
    let allow = vec!["example.com".to_string()];
    assert!(validate_url("https://example.com", &allow, &[]).ok);
    assert!(validate_url("https://deep.api.example.com", &allow, &[]).ok);
    assert!(!validate_url("https://notexample.com", &allow, &[]).ok);
}

#[test]
fn empty_allowlist_admits_any_public_host() {
    assert!(validate_url("https://anything.net", &[], &[]).ok);
}

#[test]
fn create_validation_composes_url_codes() {
    let report = validate_create(&json!({"target_url": "ftp://x.com"}), &[], &[]);
    assert_eq!(report.errors[0].code, "INVALID_SCHEME");

    let report = validate_create(&json!({}), &[], &[]);
    assert_eq!(report.errors[0].code, "INVALID_TARGET");
}
