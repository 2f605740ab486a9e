#![deny(unsafe_code)]

//! Configuration loading and validation for stevedore.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure: which daemon to talk to, how deep the
//! streaming channels are, and how chatty the logs should be.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Connection string used when no config file or `--host` flag is given.
pub const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

/// Default capacity of the consumer-facing channel behind each stream.
pub const DEFAULT_STREAM_BUFFER: usize = 100;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote daemon addressing.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Event and log stream tuning.
    #[serde(default)]
    pub streams: StreamConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the daemon lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Connection string: `unix:///path`, `tcp://host:port`, `http://host:port`,
    /// or a bare socket path.
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Streaming channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Items buffered between a stream's producer task and its consumer.
    /// A full buffer blocks the producer.
    #[serde(default = "default_stream_buffer")]
    pub buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer: default_stream_buffer(),
        }
    }
}

fn default_stream_buffer() -> usize {
    DEFAULT_STREAM_BUFFER
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "daemon.host must not be empty".to_string(),
            ));
        }
        if self.streams.buffer == 0 {
            return Err(ConfigError::Validation(
                "streams.buffer must be at least 1".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.logging.level
            )));
        }
        Ok(())
    }

    /// Replace the daemon connection string, e.g. from a `--host` flag.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.daemon.host = host.into();
        self
    }
}
