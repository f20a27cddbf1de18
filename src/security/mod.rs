//! URL policy primitives and secret masking.
//!
//! Host matching follows the allowlist convention used across the server:
//! an entry matches the exact host and any subdomain of it, and a leading
//! `*.` wildcard is accepted as an equivalent spelling.

/// Schemes a session may navigate to.
pub const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Schemes rejected outright before any host inspection.
pub const DISALLOWED_SCHEMES: &[&str] = &["chrome", "file", "about"];

/// Navigation URL prefixes the deterministic policy refuses.
const UNSAFE_NAVIGATION_PREFIXES: &[&str] =
    &["javascript:", "data:", "file:", "about:", "chrome:"];

/// Extract the scheme of a URL, lowercased, without the `://` suffix.
pub fn extract_scheme(url: &str) -> Option<String> {
    let idx = url.find(':')?;
    let scheme = &url[..idx];
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Extract the host of an http(s) URL, lowercased and without port.
pub fn extract_host(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest)?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = authority
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Whether `host` matches a single list entry.
///
/// `example.com` matches `example.com` and any `*.example.com`; a `*.`
/// prefix on the entry is accepted as the same rule.
pub fn host_matches_entry(host: &str, entry: &str) -> bool {
    if entry == "*" {
        return true;
    }
    let suffix = entry.strip_prefix("*.").unwrap_or(entry);
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Whether `host` matches any entry of the list.
pub fn host_in_list(host: &str, list: &[String]) -> bool {
    list.iter().any(|entry| host_matches_entry(host, entry))
}

/// Whether a navigation URL uses a scheme the deterministic policy blocks.
pub fn is_unsafe_navigation(url: &str) -> bool {
    let lowered = url.trim_start().to_ascii_lowercase();
    UNSAFE_NAVIGATION_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

/// Mask a secret for logs and diagnostics.
///
/// Empty or absent values become `""`; values of six characters or fewer
/// become `"***"`; longer values keep their first three characters followed
/// by at least two asterisks.
pub fn mask_secret(value: Option<&str>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    if value.is_empty() {
        return String::new();
    }
    let len = value.chars().count();
    if len <= 6 {
        return "***".to_string();
    }
    let prefix: String = value.chars().take(3).collect();
    let stars = len.saturating_sub(3).max(2);
    format!("{prefix}{}", "*".repeat(stars))
}
