//! Client configuration
//!
//! Values come from serde (file or embedded JSON) or from `WAMP_*` environment
//! variables. Every field has a default so a bare `ClientConfig::default()` talks to a
//! local WAAPI router.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Well-known WAAPI WebSocket path.
pub const DEFAULT_PATH: &str = "/waapi";
pub const DEFAULT_REALM: &str = "realm1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;

// ============================================================================
// Protocol Violation Policy
// ============================================================================

/// What the session does when the router sends something it should not.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Log the violation and keep the session running.
    #[default]
    Log,
    /// Log at error level, mark the session faulted and tear it down.
    Abort,
}

impl std::fmt::Display for ViolationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationPolicy::Log => write!(f, "log"),
            ViolationPolicy::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for ViolationPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "continue" => Ok(ViolationPolicy::Log),
            "abort" | "strict" => Ok(ViolationPolicy::Abort),
            _ => Err(()),
        }
    }
}

// ============================================================================
// Client Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub realm: String,
    /// Caller-side wait for replies. `0` waits indefinitely.
    pub request_timeout_ms: u64,
    pub violation_policy: ViolationPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.into(),
            realm: DEFAULT_REALM.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            violation_policy: ViolationPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Read `WAMP_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let host = lookup("WAMP_HOST")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.host);
        let port = lookup("WAMP_PORT")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.port);
        let path = lookup("WAMP_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.path);
        let realm = lookup("WAMP_REALM")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.realm);
        let request_timeout_ms = lookup("WAMP_REQUEST_TIMEOUT_MS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.request_timeout_ms);
        let violation_policy = match lookup("WAMP_VIOLATION_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Unknown WAMP_VIOLATION_POLICY, using default");
                defaults.violation_policy
            }),
            None => defaults.violation_policy,
        };

        Self {
            host,
            port,
            path,
            realm,
            request_timeout_ms,
            violation_policy,
        }
    }

    /// The configured reply timeout, `None` when waits are unbounded.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_point_at_local_waapi() {
        let config = ClientConfig::default();
        assert_eq!(config.path, "/waapi");
        assert_eq!(config.realm, "realm1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(120_000)));
        assert_eq!(config.violation_policy, ViolationPolicy::Log);
    }

    #[test]
    fn test_from_lookup_overrides_and_falls_back() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("WAMP_HOST", "wwise.local"),
            ("WAMP_PORT", "not-a-port"),
            ("WAMP_REQUEST_TIMEOUT_MS", "0"),
            ("WAMP_VIOLATION_POLICY", "Strict"),
        ]));

        assert_eq!(config.host, "wwise.local");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.violation_policy, ViolationPolicy::Abort);
    }

    #[test]
    fn test_unknown_policy_keeps_default() {
        let config =
            ClientConfig::from_lookup(lookup_from(&[("WAMP_VIOLATION_POLICY", "panic")]));
        assert_eq!(config.violation_policy, ViolationPolicy::Log);
    }

    #[test]
    fn test_deserialize_partial_document() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"port": 9000, "violation_policy": "abort"}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.realm, DEFAULT_REALM);
        assert_eq!(config.violation_policy, ViolationPolicy::Abort);
    }
}
