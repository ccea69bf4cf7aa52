//! Configuration loading for the Moderate Tech client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use modera_cache::{CacheConfig, RetryPolicy};
use modera_realtime::ReconnectConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub messages_ws_url: String,
    pub notifications_ws_url: String,
    pub request_timeout_ms: u64,
    pub maintenance_ttl_ms: u64,
    pub maintenance_timeout_ms: u64,
    pub refresh_interval_ms: u64,
    pub cache: CacheSettings,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub stale_after_ms: u64,
    pub evict_after_ms: u64,
    pub sweep_interval_ms: u64,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub retry_max_attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (set MODERA_CLIENT_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_env().ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.messages_ws_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "messages_ws_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.notifications_ws_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "notifications_ws_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.maintenance_ttl_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maintenance_ttl_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.maintenance_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "maintenance_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.sweep_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.retry_max_attempts",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.retry_cap_ms < self.cache.retry_base_ms {
            return Err(ConfigError::InvalidValue {
                field: "cache.retry_cap_ms",
                reason: "must be >= retry_base_ms".to_string(),
            });
        }
        if self.reconnect.initial_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.initial_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconnect.max_ms < self.reconnect.initial_ms {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.max_ms",
                reason: "must be >= initial_ms".to_string(),
            });
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.multiplier",
                reason: "must be >= 1.0".to_string(),
            });
        }
        Ok(())
    }

    /// Cache configuration derived from the raw millisecond fields.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_stale_after(Duration::from_millis(self.cache.stale_after_ms))
            .with_evict_after(Duration::from_millis(self.cache.evict_after_ms))
            .with_sweep_interval(Duration::from_millis(self.cache.sweep_interval_ms))
            .with_retry(RetryPolicy::new(
                Duration::from_millis(self.cache.retry_base_ms),
                Duration::from_millis(self.cache.retry_cap_ms),
                self.cache.retry_max_attempts,
            ))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn maintenance_ttl(&self) -> Duration {
        Duration::from_millis(self.maintenance_ttl_ms)
    }

    pub fn maintenance_timeout(&self) -> Duration {
        Duration::from_millis(self.maintenance_timeout_ms)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("MODERA_CLIENT_CONFIG").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ClientConfig {
        ClientConfig {
            api_base_url: "http://localhost:8080".to_string(),
            messages_ws_url: "ws://localhost:8080/api/messages".to_string(),
            notifications_ws_url: "ws://localhost:8080/api/notifications".to_string(),
            request_timeout_ms: 5_000,
            maintenance_ttl_ms: 30_000,
            maintenance_timeout_ms: 2_000,
            refresh_interval_ms: 15_000,
            cache: CacheSettings {
                stale_after_ms: 30_000,
                evict_after_ms: 300_000,
                sweep_interval_ms: 60_000,
                retry_base_ms: 500,
                retry_cap_ms: 30_000,
                retry_max_attempts: 5,
            },
            reconnect: ReconnectConfig {
                initial_ms: 250,
                max_ms: 5_000,
                multiplier: 1.5,
                jitter_ms: 100,
            },
        }
    }

    #[test]
    fn test_base_config_validates() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_config_requires_api_base_url() {
        let mut config = base_config();
        config.api_base_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_requires_nonzero_timeouts() {
        let mut config = base_config();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.maintenance_ttl_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_cap_below_base() {
        let mut config = base_config();
        config.cache.retry_cap_ms = 100;
        config.cache.retry_base_ms = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_reconnect() {
        let mut config = base_config();
        config.reconnect.max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.reconnect.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_config_mapping() {
        let config = base_config();
        let cache = config.cache_config();
        assert_eq!(cache.stale_after, Duration::from_secs(30));
        assert_eq!(cache.evict_after, Duration::from_secs(300));
        assert_eq!(cache.retry.max_attempts, 5);
        assert_eq!(cache.retry.base, Duration::from_millis(500));
    }

    #[test]
    fn test_config_parses_from_toml() {
        let toml_text = r#"
            api_base_url = "https://api.moderate.tech"
            messages_ws_url = "wss://api.moderate.tech/api/messages"
            notifications_ws_url = "wss://api.moderate.tech/api/notifications"
            request_timeout_ms = 5000
            maintenance_ttl_ms = 30000
            maintenance_timeout_ms = 2000
            refresh_interval_ms = 15000

            [cache]
            stale_after_ms = 30000
            evict_after_ms = 300000
            sweep_interval_ms = 60000
            retry_base_ms = 500
            retry_cap_ms = 30000
            retry_max_attempts = 5

            [reconnect]
            initial_ms = 250
            max_ms = 15000
            multiplier = 2.0
            jitter_ms = 100
        "#;
        let config: ClientConfig = toml::from_str(toml_text).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.api_base_url, "https://api.moderate.tech");
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let toml_text = r#"
            api_base_url = "https://api.moderate.tech"
            unknown_field = true
        "#;
        assert!(toml::from_str::<ClientConfig>(toml_text).is_err());
    }
}
