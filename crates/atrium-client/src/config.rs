use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use atrium_proto::Vec3;

/// Reconnection policy applied after an *unexpected* transport drop while
/// `auto_reconnect` is enabled. The reference behavior is unbounded retry
/// with no backoff; both are deliberately configuration here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReconnectPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt, doubling up to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Self-chosen client id; generated at connect time when absent.
    pub client_id: Option<String>,
    /// Opaque authentication token forwarded on every outgoing message.
    pub client_token: String,
    /// Fixed translation between this participant's local frame and the
    /// session's shared frame, established at connect time.
    pub offset: Vec3,
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// `None` waits indefinitely for a full-state response.
    #[serde(with = "opt_duration_secs")]
    pub state_request_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_token: String::new(),
            offset: Vec3::default(),
            heartbeat_interval: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            state_request_timeout: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl SyncConfig {
    /// Load from a TOML file, then apply `ATRIUM_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: SyncConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config.with_env_overrides())
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("ATRIUM_CLIENT_TOKEN") {
            self.client_token = token;
        }
        if let Some(secs) = env_u64("ATRIUM_HEARTBEAT_SECS") {
            self.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ATRIUM_STATE_TIMEOUT_SECS") {
            self.state_request_timeout = Some(Duration::from_secs(secs));
        }
        self
    }
}

fn env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok()?.trim().parse().ok()
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

mod opt_duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = SyncConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert!(config.reconnect.max_attempts.is_none());
        assert!(config.state_request_timeout.is_none());
    }

    #[test]
    fn reconnect_backoff_doubles_and_saturates() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn bounded_policy_stops_allowing_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: Some(2),
            ..ReconnectPolicy::default()
        };
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
    }

    #[test]
    fn toml_config_parses() {
        let config: SyncConfig = toml::from_str(
            r#"
            client-token = "secret"
            heartbeat-interval = 2.5
            [reconnect]
            max-attempts = 4
            initial-delay = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.client_token, "secret");
        assert_eq!(config.heartbeat_interval, Duration::from_secs_f64(2.5));
        assert_eq!(config.reconnect.max_attempts, Some(4));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs_f64(0.5));
    }
}
