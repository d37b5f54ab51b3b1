//! Gateway configuration.
//!
//! Every section defaults sensibly so a partial document deserializes.
//! Collaborators (processors, checkers, transports) are not configuration;
//! they are injected through [`crate::GatewayBuilder`].

use serde::{Deserialize, Serialize};
use shared_types::Identity;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub general: GeneralConfig,
    pub http: HttpConfig,
    pub websocket: WebSocketConfig,
    pub push: PushConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
    pub model: ModelConfig,
    /// Service description served on the meta route.
    pub meta: MetaConfig,
    pub health: HealthConfig,
}

impl GatewayConfig {
    /// Reject settings the gateway cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limit = |ok: bool, what: &str| match ok {
            true => Ok(()),
            false => Err(ConfigError::InvalidLimit(format!("{what} must be positive"))),
        };
        limit(self.http.max_body_size > 0, "http.max_body_size")?;
        limit(self.websocket.max_message_size > 0, "websocket.max_message_size")?;

        if self.push.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("push.topic is empty".into()));
        }

        let rl = &self.rate_limit;
        if rl.enabled && (rl.requests_per_second == 0 || rl.burst_size == 0) {
            return Err(ConfigError::InvalidRateLimit(format!(
                "{} per second with a burst of {} admits nothing",
                rl.requests_per_second, rl.burst_size
            )));
        }

        if !self.health.endpoint.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "health.endpoint {:?} is not an absolute path",
                self.health.endpoint
            )));
        }

        Ok(())
    }

    /// Socket address the HTTP listener binds to.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Let dispatch panics unwind instead of answering 500. Debugging only.
    pub panic_recovery_disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 443,
            max_body_size: 10 << 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Serve the event push endpoint (`/events`).
    pub push_enabled: bool,
    /// Serve the API session endpoint (`/wsapi`).
    pub api_enabled: bool,
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            push_enabled: true,
            api_enabled: true,
            max_message_size: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Topic dispatch publishes to and push sessions listen on.
    pub topic: String,
    /// Publish the events produced by dispatch.
    pub publish_enabled: bool,
    /// Deliver received publications to push sessions.
    pub dispatch_enabled: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            topic: "events".into(),
            publish_enabled: true,
            dispatch_enabled: true,
        }
    }
}

/// Settings of the stock per-IP limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    /// Tokens a fresh bucket starts with.
    pub burst_size: u32,
    /// Addresses that are never limited.
    pub whitelist: Vec<IpAddr>,
    #[serde(with = "human_duration")]
    pub cleanup_interval: Duration,
    /// Idle time after which a client's bucket is forgotten.
    #[serde(with = "human_duration")]
    pub max_bucket_age: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst_size: 200,
            whitelist: Vec::new(),
            cleanup_interval: Duration::from_secs(60),
            max_bucket_age: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origin echoed when the request carries none.
    pub allowed_origin: String,
    pub expose_headers: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime, in seconds.
    pub max_age: u64,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "*".into(),
            expose_headers: owned(&[
                "X-Requested-With",
                "X-Count-Local",
                "X-Count-Total",
                "X-Page-Current",
                "X-Page-Size",
                "X-Page-Prev",
                "X-Page-Next",
                "X-Page-First",
                "X-Page-Last",
                "X-Namespace",
            ]),
            allow_methods: owned(&["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]),
            allow_headers: owned(&[
                "Authorization",
                "Accept",
                "Content-Type",
                "Cache-Control",
                "Cookie",
                "If-Modified-Since",
                "X-Requested-With",
                "X-Count-Total",
                "X-Namespace",
            ]),
            allow_credentials: true,
            max_age: 1500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Refuse every write with `423 Locked`.
    pub read_only: bool,
    /// Identities still writable while read-only.
    pub read_only_excluded_identities: Vec<Identity>,
}

impl ModelConfig {
    /// True when writes to `identity` are currently refused.
    pub fn is_locked(&self, identity: &Identity) -> bool {
        self.read_only
            && !self
                .read_only_excluded_identities
                .iter()
                .any(|excluded| excluded.name == identity.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaConfig {
    pub service_name: String,
    pub service_version: String,
    /// Do not serve `/_meta/version`.
    pub disable_meta_route: bool,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            service_name: "api-gateway".into(),
            service_version: env!("CARGO_PKG_VERSION").into(),
            disable_meta_route: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/_health".into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Durations written as `500ms`, `60s` or `10m`. A bare number means seconds.
mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(text: &str) -> Result<Duration, humantime::DurationError> {
        let text = text.trim();
        match text.parse::<u64>() {
            Ok(secs) => Ok(Duration::from_secs(secs)),
            Err(_) => humantime::parse_duration(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_addr().port(), 443);
        assert_eq!(config.push.topic, "events");
        assert_eq!(config.health.endpoint, "/_health");
        assert!(!config.general.panic_recovery_disabled);
    }

    #[test]
    fn test_enabled_rate_limit_needs_budget() {
        let mut config = GatewayConfig::default();
        config.rate_limit.burst_size = 0;
        // Ignored while disabled.
        assert!(config.validate().is_ok());

        config.rate_limit.enabled = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let mut config = GatewayConfig::default();
        config.websocket.max_message_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));
    }

    #[test]
    fn test_blank_topic_rejected() {
        let mut config = GatewayConfig::default();
        config.push.topic = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_relative_health_endpoint_rejected() {
        let mut config = GatewayConfig::default();
        config.health.endpoint = "health".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: GatewayConfig = serde_json::from_value(serde_json::json!({
            "general": { "panic_recovery_disabled": true },
            "rate_limit": { "enabled": true, "cleanup_interval": "500ms" },
            "model": { "read_only": true, "read_only_excluded_identities": [
                { "name": "session", "category": "sessions" }
            ]}
        }))
        .unwrap();

        assert!(config.general.panic_recovery_disabled);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.cleanup_interval, Duration::from_millis(500));
        assert_eq!(config.rate_limit.requests_per_second, 100);
        assert!(config.model.is_locked(&Identity::new("list", "lists")));
        assert!(!config.model.is_locked(&Identity::new("session", "sessions")));
    }

    #[test]
    fn test_duration_formats() {
        assert_eq!(human_duration::parse("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(human_duration::parse(" 15 ").unwrap(), Duration::from_secs(15));
        assert!(human_duration::parse("soon").is_err());

        let json = serde_json::to_value(RateLimitConfig::default()).unwrap();
        assert_eq!(json["max_bucket_age"], "10m");
        let back: RateLimitConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.max_bucket_age, Duration::from_secs(600));
    }
}
