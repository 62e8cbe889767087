//! Configuration management

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Prefix for environment overrides, e.g. `MINIATS__EXCHANGE__MAX_CONNECTIONS=8`
const ENV_PREFIX: &str = "MINIATS";

/// Configuration file looked up next to the working directory
const DEFAULT_CONFIG_NAME: &str = "miniats";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub exchange: ExchangeConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// What the switch itself needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Number of calls the exchange can carry at once
    pub max_connections: usize,
    /// Zero-pad width of subscriber numbers
    pub number_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_connections: 4,
            number_length: 3,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9100,
        }
    }
}

impl ExchangeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "exchange.max_connections must be at least 1".to_string(),
            ));
        }
        if self.number_length == 0 {
            return Err(ConfigError::Invalid(
                "exchange.number_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Exporter address: the server host with the metrics port. The host
    /// must be an IP literal.
    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.metrics.port)
            .parse()
            .map_err(|e| {
                ConfigError::Invalid(format!(
                    "metrics address {}:{}: {}",
                    self.server.host, self.metrics.port, e
                ))
            })
    }

    /// Load from an explicit file (required) or from `miniats.*` in the
    /// working directory (optional), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let config: Config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.exchange.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but never fails: any error falls back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match Self::load(path) {
            Ok(config) => {
                info!(
                    "Configuration loaded: max_connections={}, number_length={}",
                    config.exchange.max_connections, config.exchange.number_length
                );
                config
            }
            Err(e) => {
                warn!("{}; using built-in defaults", e);
                Self::default()
            }
        }
    }
}
