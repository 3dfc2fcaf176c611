use serde::Deserialize;

use std::{net::SocketAddr, path::Path, time::Duration};

use crate::waiter::DEFAULT_POLL_INTERVAL;

const DEFAULT_REST_URL: &str = "http://localhost:8100";
const DEFAULT_TIMEOUT_MINUTES: u64 = 5;
const DEFAULT_REFRESH_AFTER_MS: u64 = 1000;
const DEFAULT_EVENT_LOGGER: &str = "EventLogger";
const DEFAULT_BIND: &str = "0.0.0.0:4320";
const DEFAULT_LABEL_PREFIX: &str = "io.deploywatch";

fn default_rest_url() -> String {
    DEFAULT_REST_URL.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MINUTES
}

fn default_refresh_after() -> u64 {
    DEFAULT_REFRESH_AFTER_MS
}

fn default_event_logger() -> String {
    DEFAULT_EVENT_LOGGER.to_string()
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_true() -> bool {
    true
}

fn default_label_prefix() -> String {
    DEFAULT_LABEL_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeploywatchConfig {
    /// Base URL of the platform's management REST API.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Seconds between two polls of a watched operation.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Minutes to wait for an operation before giving up.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Milliseconds a cached event snapshot stays fresh.
    #[serde(default = "default_refresh_after")]
    pub refresh_after: u64,
    /// Name of the logger whose records are turned into events.
    #[serde(default = "default_event_logger")]
    pub event_logger: String,
    /// Listen address of the events API.
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_true")]
    pub wait_for_resources_release: bool,
    /// Prefix of the container labels describing worker processes.
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
}

impl Default for DeploywatchConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            poll_interval: default_poll_interval(),
            timeout: default_timeout(),
            refresh_after: default_refresh_after(),
            event_logger: default_event_logger(),
            bind: default_bind(),
            wait_for_resources_release: true,
            label_prefix: default_label_prefix(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid bind address {0}: {1}")]
    Bind(String, std::net::AddrParseError),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl DeploywatchConfig {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(val)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the config at `path`. A missing file means defaults.
    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(config) => Self::try_init_from_string(&config),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval == 0 {
            return Err(ConfigError::Zero("poll_interval"));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Zero("timeout"));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.saturating_mul(60))
    }

    pub fn refresh_after(&self) -> Duration {
        Duration::from_millis(self.refresh_after)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::Bind(self.bind.clone(), e))
    }
}
