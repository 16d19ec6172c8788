// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client configuration.
//!
//! Supports both programmatic and file-based configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint receiving protocol messages.
    pub url: String,

    /// Per-request timeout (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Connection id stamped into message heads and push URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,

    /// Retry policy for connection errors.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Server push settings.
    #[serde(default)]
    pub server_push: ServerPushConfig,
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/rap".to_string(),
            request_timeout_ms: default_request_timeout(),
            log_level: default_log_level(),
            connection_id: None,
            retry: RetryConfig::default(),
            server_push: ServerPushConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Builder: set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: set the connection id.
    pub fn with_connection_id(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }

    /// Builder: disable server push.
    pub fn without_server_push(mut self) -> Self {
        self.server_push.enabled = false;
        self
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".into()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "url must use http or https: {}",
                self.url
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be > 0".into()));
        }
        if self.server_push.enabled && self.server_push.service_handler.is_empty() {
            return Err(ConfigError::Invalid(
                "server_push.service_handler must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Linear retry policy for connection errors.
///
/// Retry `n` (1-based) waits `base_delay * n`; after `max_retries` retries
/// the failure becomes terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay (milliseconds).
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum number of retries before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_retries: default_max_retries(),
        }
    }
}

impl RetryConfig {
    /// Create with custom base delay and retry cap.
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay_ms: base_delay.as_millis() as u64,
            max_retries,
        }
    }

    /// Base delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Server push configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPushConfig {
    /// Run the push channel.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Service handler parameter identifying push requests.
    #[serde(default = "default_service_handler")]
    pub service_handler: String,
}

fn default_true() -> bool {
    true
}

fn default_service_handler() -> String {
    "org.eclipse.rap.serverpush".to_string()
}

impl Default for ServerPushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_handler: default_service_handler(),
        }
    }
}
