//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::admission::AdmissionPolicy;
use crate::error::{Result, TurnstileError};

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store (Redis) configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Admission limits
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Completion provider configuration
    #[serde(default)]
    pub completion: CompletionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Resolve the client from `X-Forwarded-For` / `X-Real-IP` before the peer address.
    /// Only enable this behind a proxy that overwrites those headers.
    #[serde(default)]
    pub trust_forwarded_headers: bool,

    /// CORS preflight cache lifetime in seconds
    #[serde(default = "default_cors_max_age")]
    pub cors_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            trust_forwarded_headers: false,
            cors_max_age_secs: default_cors_max_age(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_cors_max_age() -> u64 {
    12 * 60 * 60
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Timeout for establishing a connection, in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single command response, in milliseconds
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,

    /// Upper bound on any single store round trip made by the gate, in milliseconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Reconnect attempts made by the connection manager
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Timeout for the startup ping, in milliseconds
    #[serde(default = "default_startup_ping_timeout")]
    pub startup_ping_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_timeout_ms: default_connect_timeout(),
            response_timeout_ms: default_response_timeout(),
            call_timeout_ms: default_call_timeout(),
            max_retries: default_max_retries(),
            startup_ping_timeout_ms: default_startup_ping_timeout(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_response_timeout() -> u64 {
    5_000
}

fn default_call_timeout() -> u64 {
    5_000
}

fn default_max_retries() -> usize {
    3
}

fn default_startup_ping_timeout() -> u64 {
    10_000
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn startup_ping_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_ping_timeout_ms)
    }
}

/// Admission limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Requests admitted per client per UTC day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    /// Requests that trip a ban inside one short window
    #[serde(default = "default_window_limit")]
    pub window_limit: u64,

    /// Short window length in seconds, refreshed on every admitted request
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Ban duration in seconds
    #[serde(default = "default_ban_secs")]
    pub ban_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            window_limit: default_window_limit(),
            window_secs: default_window_secs(),
            ban_secs: default_ban_secs(),
        }
    }
}

fn default_daily_limit() -> u64 {
    100
}

fn default_window_limit() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_ban_secs() -> u64 {
    7 * 24 * 60 * 60
}

/// Completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token for the provider
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model requested for every completion
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_completion_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_completion_timeout() -> u64 {
    60
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig =
            serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the gate cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let admission = &self.admission;
        if admission.daily_limit == 0 || admission.window_limit == 0 {
            return Err(TurnstileError::Config(
                "admission limits must be greater than zero".to_string(),
            ));
        }
        if admission.window_secs == 0 || admission.ban_secs == 0 {
            return Err(TurnstileError::Config(
                "admission durations must be greater than zero".to_string(),
            ));
        }
        if self.store.call_timeout_ms == 0 {
            return Err(TurnstileError::Config(
                "store.call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the gate policy from the admission and store sections.
    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            daily_limit: self.admission.daily_limit,
            window_limit: self.admission.window_limit,
            window_ttl: Duration::from_secs(self.admission.window_secs),
            ban_ttl: Duration::from_secs(self.admission.ban_secs),
            store_timeout: self.store.call_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_service_limits() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.admission.daily_limit, 100);
        assert_eq!(config.admission.window_limit, 10);
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.admission.ban_secs, 604_800);
        assert_eq!(config.store.max_retries, 3);
        assert_eq!(config.completion.model, "gpt-4o-mini");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
store:
  url: redis://cache:6379/
admission:
  daily_limit: 250
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.url, "redis://cache:6379/");
        assert_eq!(config.store.response_timeout_ms, 5_000);
        assert_eq!(config.admission.daily_limit, 250);
        assert_eq!(config.admission.window_limit, 10);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
admission:
  window_limit: 0
"#;
        let err = TurnstileConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_admission_policy_from_config() {
        let config = TurnstileConfig::default();
        let policy = config.admission_policy();
        assert_eq!(policy.window_ttl, Duration::from_secs(60));
        assert_eq!(policy.ban_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(policy.store_timeout, Duration::from_secs(5));
    }
}
