//! Configuration module
//!
//! Handles loading and saving msp-osd configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::{NetworkConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESPONSE_TIMEOUT_MS};
use crate::protocol::{DEFAULT_MAX_PAYLOAD, DEFAULT_PORT};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Flight controller endpoint
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Request/response discipline
    #[serde(default)]
    pub link: LinkConfig,
}

/// Flight controller endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Address of the MSP endpoint
    #[serde(default = "default_address")]
    pub address: String,
    /// TCP port of the MSP endpoint
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connection timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

/// Link timing and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Interval between polling rounds in ms
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Time a request may stay unanswered before the link is dropped
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    /// Largest payload accepted from the flight controller
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_response_timeout() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            response_timeout_ms: default_response_timeout(),
            max_payload: default_max_payload(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("msp-osd/config.toml")),
            Some(PathBuf::from("./msp-osd.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Network settings for the link
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            connect_timeout_ms: self.connection.connect_timeout_ms,
            poll_interval_ms: self.link.poll_interval_ms,
            response_timeout_ms: self.link.response_timeout_ms,
            max_payload: self.link.max_payload,
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        connection: ConnectionConfig {
            address: "192.168.1.50".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
