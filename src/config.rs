//! Application configuration

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use reqwest::Url;
use serde::Deserialize;
use serde_with::serde_as;

use crate::{errors::FleetError, models::VesselId};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Backend root, e.g. `https://fleet.example.com`
    pub base_url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
    /// Value of the session cookie sent with every request
    #[serde(default)]
    pub session_cookie: Option<String>,
}

/// Retry policy for idempotent GET requests
#[serde_as]
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub base_delay: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub max_delay: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: Duration,
    /// Vessel selected on startup, first vessel in the list if unset
    #[serde(default)]
    pub vessel_id: Option<VesselId>,
    pub cashflow_months: u32,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            vessel_id: None,
            cashflow_months: 6,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("FLEETSYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<(), FleetError> {
        self.api.validate()?;
        self.retry.validate()?;
        self.sync.validate()?;
        Ok(())
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        let url = Url::parse(&self.base_url).map_err(|e| FleetError::ConfigurationError {
            message: format!("Invalid base URL {}: {}", self.base_url, e),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FleetError::ConfigurationError {
                message: format!("Base URL must be http or https, got {}", url.scheme()),
            });
        }
        if self.timeout.is_zero() {
            return Err(FleetError::ConfigurationError {
                message: "Request timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.max_attempts == 0 {
            return Err(FleetError::ConfigurationError {
                message: "Retry attempts must be at least 1".to_string(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(FleetError::ConfigurationError {
                message: "Retry base delay cannot exceed max delay".to_string(),
            });
        }
        Ok(())
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.poll_interval.is_zero() {
            return Err(FleetError::ConfigurationError {
                message: "Poll interval must be greater than zero".to_string(),
            });
        }
        if self.cashflow_months == 0 {
            return Err(FleetError::ConfigurationError {
                message: "Cash-flow window must cover at least one month".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_config() {
        env::set_var("FLEETSYNC__API__BASE_URL", "http://localhost:8080");
        env::set_var("FLEETSYNC__API__TIMEOUT", "15");
        env::set_var("FLEETSYNC__RETRY__MAX_ATTEMPTS", "4");
        env::set_var("FLEETSYNC__RETRY__BASE_DELAY", "100");
        env::set_var("FLEETSYNC__RETRY__MAX_DELAY", "2000");
        env::set_var("FLEETSYNC__SYNC__POLL_INTERVAL", "10");
        env::set_var("FLEETSYNC__SYNC__VESSEL_ID", "7");
        env::set_var("FLEETSYNC__SYNC__CASHFLOW_MONTHS", "3");

        let config = AppConfig::load().unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.api.timeout, Duration::from_secs(15));
        assert_eq!(config.api.session_cookie, None);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, Duration::from_secs(2));
        assert_eq!(config.sync.poll_interval, Duration::from_secs(10));
        assert_eq!(config.sync.vessel_id, Some(VesselId::try_from(7).unwrap()));
        assert_eq!(config.sync.cashflow_months, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_config_validate_invalid_url() {
        let config = ApiConfig {
            base_url: "not a url".to_string(),
            timeout: Duration::from_secs(10),
            session_cookie: None,
        };
        assert!(config.validate().is_err());

        let config = ApiConfig {
            base_url: "ftp://fleet.example.com".to_string(),
            timeout: Duration::from_secs(10),
            session_cookie: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_config_validate_zero_timeout() {
        let config = ApiConfig {
            base_url: "https://fleet.example.com".to_string(),
            timeout: Duration::ZERO,
            session_cookie: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_validate() {
        assert!(RetryConfig::default().validate().is_ok());

        let zero_attempts = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(zero_attempts.validate().is_err());

        let inverted = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_sync_config_validate() {
        assert!(SyncConfig::default().validate().is_ok());

        let no_window = SyncConfig {
            cashflow_months: 0,
            ..SyncConfig::default()
        };
        assert!(no_window.validate().is_err());
    }
}
