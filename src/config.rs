//! Cache configuration.
//!
//! Values come from the environment (see [`CacheConfig::from_env`]); anything
//! unset falls back to [`CacheConfig::default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::KeyBuilder;

/// Environment variables read by [`CacheConfig::from_env`].
pub const ENV_REDIS_URL: &str = "CACHE_REDIS_URL";
pub const ENV_NAMESPACE: &str = "CACHE_NAMESPACE";
pub const ENV_KEY_VERSION: &str = "CACHE_KEY_VERSION";
pub const ENV_RECONNECT_BASE_MS: &str = "CACHE_RECONNECT_BASE_MS";
pub const ENV_RECONNECT_MAX_MS: &str = "CACHE_RECONNECT_MAX_MS";
pub const ENV_MAX_RETRIES: &str = "CACHE_MAX_RETRIES";
pub const ENV_RESPONSE_TIMEOUT_MS: &str = "CACHE_RESPONSE_TIMEOUT_MS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Reconnect and retry behavior for the backend connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay unit of the reconnect supervisor: attempt `n` waits
    /// `min(n * base_delay, max_delay)`.
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Cap for both the supervisor and the connection manager's own
    /// exponential in-command reconnect backoff.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Retries of a single command before it is reported as failed.
    pub max_retries_per_operation: usize,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(2000),
            max_retries_per_operation: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before supervisor attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub redis_url: String,
    pub namespace: String,
    pub version: String,
    pub reconnect: ReconnectPolicy,
    /// Per-command timeout; `None` keeps the client library's behavior.
    #[serde(with = "opt_millis")]
    pub response_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_owned(),
            namespace: "app".to_owned(),
            version: "v1".to_owned(),
            reconnect: ReconnectPolicy::default(),
            response_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Reads the `CACHE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let number = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidNumber { var, value })
                })
                .transpose()
        };

        if let Some(url) = lookup(ENV_REDIS_URL) {
            config.redis_url = url;
        }
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            config.namespace = namespace;
        }
        if let Some(version) = lookup(ENV_KEY_VERSION) {
            config.version = version;
        }
        if let Some(ms) = number(ENV_RECONNECT_BASE_MS)? {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = number(ENV_RECONNECT_MAX_MS)? {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = number(ENV_MAX_RETRIES)? {
            config.reconnect.max_retries_per_operation = retries as usize;
        }
        if let Some(ms) = number(ENV_RESPONSE_TIMEOUT_MS)? {
            config.response_timeout = Some(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Key builder for the configured namespace and version.
    pub fn key_builder(&self) -> KeyBuilder {
        KeyBuilder::new(&self.namespace, &self.version)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = CacheConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.key_builder().build("users", 1).as_str(), "app:v1:users:1");
    }

    #[test]
    fn environment_overrides() {
        let config = CacheConfig::from_lookup(lookup(&[
            (ENV_NAMESPACE, "shop"),
            (ENV_KEY_VERSION, "v7"),
            (ENV_MAX_RETRIES, "5"),
            (ENV_RESPONSE_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.namespace, "shop");
        assert_eq!(config.reconnect.max_retries_per_operation, 5);
        assert_eq!(config.response_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.key_builder().pattern_all("users"), "shop:v7:users:*");
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = CacheConfig::from_lookup(lookup(&[(ENV_MAX_RETRIES, "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: ENV_MAX_RETRIES,
                value: "lots".to_owned()
            }
        );
    }

    #[test]
    fn backoff_is_linear_then_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(4), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1000), Duration::from_millis(2000));
    }

    #[test]
    fn supervisor_schedule_starts_at_base_delay() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(35),
            max_retries_per_operation: 1,
        };
        let schedule: Vec<u64> = (1..=5)
            .map(|n| policy.delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(schedule, [10, 20, 30, 35, 35]);
        assert_eq!(policy.delay_for(0), policy.base_delay);
    }

    #[test]
    fn deserializes_partial_json() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"namespace":"n","reconnect":{"max_delay":100}}"#).unwrap();
        assert_eq!(config.namespace, "n");
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(100));
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(50));
    }
}
