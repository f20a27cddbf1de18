//! Server configuration.
//!
//! Configuration is environment-driven. Every variable is parsed
//! defensively: unparseable, non-positive, or otherwise out-of-range values
//! fall back to the built-in default instead of failing startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default maximum number of concurrent sessions per process.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Default idle-session age before garbage collection, 30 minutes.
pub const DEFAULT_SESSION_MAX_AGE_MS: u64 = 30 * 60 * 1000;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8377;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Stdio,
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    ModelOwnsAction,
    Deterministic,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelOwnsAction => "model_owns_action",
            Self::Deterministic => "deterministic",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "model_owns_action" => Some(Self::ModelOwnsAction),
            "deterministic" => Some(Self::Deterministic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub max_sessions: usize,
    pub headless: bool,
    pub allowlist: Vec<String>,
    pub denylist: Vec<String>,
    pub policy_mode: PolicyMode,
    pub session_max_age_ms: u64,
    pub traces_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_sessions: DEFAULT_MAX_SESSIONS,
            headless: true,
            allowlist: Vec::new(),
            denylist: Vec::new(),
            policy_mode: PolicyMode::ModelOwnsAction,
            session_max_age_ms: DEFAULT_SESSION_MAX_AGE_MS,
            traces_root: default_traces_root(),
        }
    }
}

/// Traces root, resolved once from the working directory.
fn default_traces_root() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("traces")
}

impl Config {
    /// Build a config from `WEBAGENTD_*` environment variables on top of
    /// the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("WEBAGENTD_TRANSPORT") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "rest" => config.transport = Transport::Rest,
                "stdio" => config.transport = Transport::Stdio,
                other => {
                    tracing::warn!(transport = %other, "Unknown WEBAGENTD_TRANSPORT; using stdio");
                }
            }
        }

        if let Ok(raw) = std::env::var("WEBAGENTD_HOST") {
            let host = raw.trim().to_string();
            if !host.is_empty() {
                config.host = host;
            }
        }

        if let Some(port) = parse_env_u64("WEBAGENTD_PORT", 1, 65535) {
            config.port = port as u16;
        }

        if let Some(max) = parse_env_u64("WEBAGENTD_MAX_SESSIONS", 1, u64::MAX) {
            config.max_sessions = max as usize;
        }

        if let Ok(raw) = std::env::var("WEBAGENTD_HEADLESS") {
            config.headless = parse_bool(&raw).unwrap_or(true);
        }

        if let Ok(raw) = std::env::var("WEBAGENTD_ALLOWLIST") {
            config.allowlist = parse_host_list(&raw);
        }

        if let Ok(raw) = std::env::var("WEBAGENTD_DENYLIST") {
            config.denylist = parse_host_list(&raw);
        }

        if let Ok(raw) = std::env::var("WEBAGENTD_POLICY") {
            match PolicyMode::parse(&raw) {
                Some(mode) => config.policy_mode = mode,
                None => {
                    tracing::warn!(policy = %raw, "Unknown WEBAGENTD_POLICY; using model_owns_action");
                }
            }
        }

        if let Some(age) = parse_env_u64("WEBAGENTD_SESSION_MAX_AGE_MS", 1, u64::MAX) {
            config.session_max_age_ms = age;
        }

        if let Ok(raw) = std::env::var("WEBAGENTD_TRACES_ROOT") {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                config.traces_root = PathBuf::from(trimmed);
            }
        }

        config
    }
}

/// Parse a positive integer env var; out-of-range or junk values yield None.
fn parse_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if (min..=max).contains(&value) => Some(value),
        _ => {
            tracing::warn!(var = name, value = %raw, "Ignoring out-of-range value");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated host list, dropping empty entries.
fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.max_sessions, 4);
        assert!(config.headless);
        assert_eq!(config.session_max_age_ms, 30 * 60 * 1000);
        assert_eq!(config.policy_mode, PolicyMode::ModelOwnsAction);
    }

    #[test]
    fn host_list_parsing_drops_empties() {
        let hosts = parse_host_list("example.com, ,*.Docs.org,");
        assert_eq!(hosts, vec!["example.com".to_string(), "*.docs.org".to_string()]);
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn policy_mode_parse_rejects_unknown() {
        assert_eq!(PolicyMode::parse("deterministic"), Some(PolicyMode::Deterministic));
        assert_eq!(PolicyMode::parse("yolo"), None);
    }
}
