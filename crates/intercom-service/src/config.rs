//! Intercom service configuration.
//!
//! Configuration is loaded from environment variables. The bridge API key is
//! held as a `SecretString` and redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default idle timeout handed to the bridge for every allocated endpoint.
pub const DEFAULT_ENDPOINT_IDLE_TIMEOUT_SECONDS: u64 = 60;

/// A session heard from within this window is active.
pub const DEFAULT_SESSION_ACTIVE_THRESHOLD_SECONDS: u64 = 10;

/// A session silent for longer than this is expired.
pub const DEFAULT_SESSION_DISCONNECT_THRESHOLD_SECONDS: u64 = 30;

/// Default interval of the session expiry sweep.
pub const DEFAULT_SESSION_SWEEP_INTERVAL_MS: u64 = 1000;

/// Default participant long-poll window.
pub const DEFAULT_LONG_POLL_TIMEOUT_SECONDS: u64 = 25;

/// Default interval of the bridge status poller.
pub const DEFAULT_BRIDGE_STATUS_INTERVAL_SECONDS: u64 = 10;

/// Intercom service configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:8000").
    pub bind_address: String,

    /// Conferences base URL of the media bridge, e.g.
    /// `http://bridge:8080/conferences/`.
    pub bridge_url: String,

    /// Bearer key for the bridge. `None` when the bridge is unauthenticated.
    pub bridge_api_key: Option<SecretString>,

    /// Idle timeout requested for each allocated endpoint.
    pub endpoint_idle_timeout_seconds: u64,

    pub session_active_threshold: Duration,

    pub session_disconnect_threshold: Duration,

    pub session_sweep_interval: Duration,

    /// Upper bound for a participant long-poll.
    pub long_poll_timeout: Duration,

    pub bridge_status_interval: Duration,

    /// Seconds to keep serving after a shutdown signal.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("bridge_url", &self.bridge_url)
            .field(
                "bridge_api_key",
                &self.bridge_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "endpoint_idle_timeout_seconds",
                &self.endpoint_idle_timeout_seconds,
            )
            .field("session_active_threshold", &self.session_active_threshold)
            .field(
                "session_disconnect_threshold",
                &self.session_disconnect_threshold,
            )
            .field("session_sweep_interval", &self.session_sweep_interval)
            .field("long_poll_timeout", &self.long_poll_timeout)
            .field("bridge_status_interval", &self.bridge_status_interval)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid session thresholds: {0}")]
    InvalidThresholds(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bridge_url = vars
            .get("BRIDGE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("BRIDGE_URL".to_string()))?
            .clone();

        if !bridge_url.starts_with("http://") && !bridge_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                name: "BRIDGE_URL".to_string(),
                reason: format!("must be an http(s) URL, got '{}'", bridge_url),
            });
        }

        let bridge_api_key = vars
            .get("BRIDGE_API_KEY")
            .filter(|v| !v.is_empty())
            .map(|v| SecretString::from(v.clone()));

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let endpoint_idle_timeout_seconds = parse_positive(
            vars,
            "ENDPOINT_IDLE_TIMEOUT_SECONDS",
            DEFAULT_ENDPOINT_IDLE_TIMEOUT_SECONDS,
        )?;

        let active_secs = parse_positive(
            vars,
            "SESSION_ACTIVE_THRESHOLD_SECONDS",
            DEFAULT_SESSION_ACTIVE_THRESHOLD_SECONDS,
        )?;
        let disconnect_secs = parse_positive(
            vars,
            "SESSION_DISCONNECT_THRESHOLD_SECONDS",
            DEFAULT_SESSION_DISCONNECT_THRESHOLD_SECONDS,
        )?;
        if disconnect_secs <= active_secs {
            return Err(ConfigError::InvalidThresholds(format!(
                "SESSION_DISCONNECT_THRESHOLD_SECONDS ({}) must exceed SESSION_ACTIVE_THRESHOLD_SECONDS ({})",
                disconnect_secs, active_secs
            )));
        }

        let sweep_ms = parse_positive(
            vars,
            "SESSION_SWEEP_INTERVAL_MS",
            DEFAULT_SESSION_SWEEP_INTERVAL_MS,
        )?;
        let long_poll_secs = parse_positive(
            vars,
            "LONG_POLL_TIMEOUT_SECONDS",
            DEFAULT_LONG_POLL_TIMEOUT_SECONDS,
        )?;
        let status_secs = parse_positive(
            vars,
            "BRIDGE_STATUS_INTERVAL_SECONDS",
            DEFAULT_BRIDGE_STATUS_INTERVAL_SECONDS,
        )?;

        // Drain may legitimately be zero.
        let drain_seconds = match vars.get("DRAIN_SECONDS") {
            Some(value) => value.parse().map_err(|e| ConfigError::InvalidValue {
                name: "DRAIN_SECONDS".to_string(),
                reason: format!("must be a non-negative integer, got '{}': {}", value, e),
            })?,
            None => 0,
        };

        Ok(Config {
            bind_address,
            bridge_url,
            bridge_api_key,
            endpoint_idle_timeout_seconds,
            session_active_threshold: Duration::from_secs(active_secs),
            session_disconnect_threshold: Duration::from_secs(disconnect_secs),
            session_sweep_interval: Duration::from_millis(sweep_ms),
            long_poll_timeout: Duration::from_secs(long_poll_secs),
            bridge_status_interval: Duration::from_secs(status_secs),
            drain_seconds,
        })
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid positive integer, got '{}': {}", value_str, e),
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "BRIDGE_URL".to_string(),
            "http://bridge.local:8080/conferences/".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.bridge_url, "http://bridge.local:8080/conferences/");
        assert!(config.bridge_api_key.is_none());
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(
            config.endpoint_idle_timeout_seconds,
            DEFAULT_ENDPOINT_IDLE_TIMEOUT_SECONDS
        );
        assert_eq!(config.session_active_threshold, Duration::from_secs(10));
        assert_eq!(config.session_disconnect_threshold, Duration::from_secs(30));
        assert_eq!(config.session_sweep_interval, Duration::from_millis(1000));
        assert_eq!(config.long_poll_timeout, Duration::from_secs(25));
        assert_eq!(config.bridge_status_interval, Duration::from_secs(10));
        assert_eq!(config.drain_seconds, 0);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert("BRIDGE_API_KEY".to_string(), "key-123".to_string());
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("ENDPOINT_IDLE_TIMEOUT_SECONDS".to_string(), "120".to_string());
        vars.insert("SESSION_ACTIVE_THRESHOLD_SECONDS".to_string(), "5".to_string());
        vars.insert("SESSION_DISCONNECT_THRESHOLD_SECONDS".to_string(), "20".to_string());
        vars.insert("LONG_POLL_TIMEOUT_SECONDS".to_string(), "10".to_string());
        vars.insert("DRAIN_SECONDS".to_string(), "3".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(
            config.bridge_api_key.as_ref().unwrap().expose_secret(),
            "key-123"
        );
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.endpoint_idle_timeout_seconds, 120);
        assert_eq!(config.session_active_threshold, Duration::from_secs(5));
        assert_eq!(config.session_disconnect_threshold, Duration::from_secs(20));
        assert_eq!(config.long_poll_timeout, Duration::from_secs(10));
        assert_eq!(config.drain_seconds, 3);
    }

    #[test]
    fn test_missing_bridge_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "BRIDGE_URL"));
    }

    #[test]
    fn test_bridge_url_must_be_http() {
        let mut vars = base_vars();
        vars.insert("BRIDGE_URL".to_string(), "bridge:8080".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { name, .. }) if name == "BRIDGE_URL"
        ));
    }

    #[test]
    fn test_empty_api_key_means_unauthenticated() {
        let mut vars = base_vars();
        vars.insert("BRIDGE_API_KEY".to_string(), String::new());
        let config = Config::from_vars(&vars).unwrap();
        assert!(config.bridge_api_key.is_none());
    }

    #[test]
    fn test_rejects_zero_idle_timeout() {
        let mut vars = base_vars();
        vars.insert("ENDPOINT_IDLE_TIMEOUT_SECONDS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { reason, .. }) if reason.contains("greater than 0")
        ));
    }

    #[test]
    fn test_rejects_non_numeric_sweep_interval() {
        let mut vars = base_vars();
        vars.insert("SESSION_SWEEP_INTERVAL_MS".to_string(), "fast".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue { reason, .. }) if reason.contains("valid positive integer")
        ));
    }

    #[test]
    fn test_disconnect_threshold_must_exceed_active() {
        let mut vars = base_vars();
        vars.insert("SESSION_ACTIVE_THRESHOLD_SECONDS".to_string(), "30".to_string());
        vars.insert("SESSION_DISCONNECT_THRESHOLD_SECONDS".to_string(), "30".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidThresholds(_))
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut vars = base_vars();
        vars.insert("BRIDGE_API_KEY".to_string(), "super-secret-key".to_string());
        let config = Config::from_vars(&vars).unwrap();

        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-key"));
    }
}
