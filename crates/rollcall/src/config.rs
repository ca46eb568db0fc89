// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server and client configuration.

use crate::transport::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Endpoint participants dial to answer polls (default: tcp://0.0.0.0:40007)
    #[serde(default = "default_poll_endpoint")]
    pub poll_endpoint: String,

    /// Endpoint subscribers dial to receive membership changes (default: tcp://0.0.0.0:50007)
    #[serde(default = "default_publish_endpoint")]
    pub publish_endpoint: String,

    /// Pause between the end of one round and the next poll (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Quiet period without replies that ends a round (milliseconds)
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,

    /// Hard upper bound the survey transport enforces on a round (milliseconds)
    #[serde(default = "default_survey_timeout")]
    pub survey_timeout_ms: u64,

    /// Maximum frame size accepted on either endpoint (bytes)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_poll_endpoint() -> String {
    "tcp://0.0.0.0:40007".to_string()
}

fn default_publish_endpoint() -> String {
    "tcp://0.0.0.0:50007".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_reply_timeout() -> u64 {
    250
}

fn default_survey_timeout() -> u64 {
    500
}

fn default_max_frame_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_subscriber_capacity() -> usize {
    8
}

fn default_retry_delay() -> u64 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            poll_endpoint: default_poll_endpoint(),
            publish_endpoint: default_publish_endpoint(),
            poll_interval_ms: default_poll_interval(),
            reply_timeout_ms: default_reply_timeout(),
            survey_timeout_ms: default_survey_timeout(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn survey_timeout(&self) -> Duration {
        Duration::from_millis(self.survey_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_endpoint("poll_endpoint", &self.poll_endpoint)?;
        parse_endpoint("publish_endpoint", &self.publish_endpoint)?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "poll_interval_ms cannot be 0".into(),
            ));
        }
        if self.reply_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "reply_timeout_ms cannot be 0".into(),
            ));
        }
        if self.survey_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "survey_timeout_ms cannot be 0".into(),
            ));
        }
        check_frame_size(self.max_frame_size)
    }
}

/// Participant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Coordinator poll endpoint to dial
    pub poll_endpoint: String,

    /// Coordinator publish endpoint; `None` disables the owned subscriber
    #[serde(default)]
    pub publish_endpoint: Option<String>,

    /// Identity sent in reply to every poll
    pub identity: String,

    /// Depth of the membership delivery buffer
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    /// Pause before retrying after a receive failure (milliseconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Maximum frame size accepted from the coordinator (bytes)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Responder-only configuration.
    pub fn new(poll_endpoint: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            poll_endpoint: poll_endpoint.into(),
            publish_endpoint: None,
            identity: identity.into(),
            subscriber_capacity: default_subscriber_capacity(),
            retry_delay_ms: default_retry_delay(),
            max_frame_size: default_max_frame_size(),
        }
    }

    /// Also subscribe to membership changes on `publish_endpoint`.
    pub fn with_subscriber(mut self, publish_endpoint: impl Into<String>) -> Self {
        self.publish_endpoint = Some(publish_endpoint.into());
        self
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn subscriber_options(&self) -> SubscriberOptions {
        SubscriberOptions {
            capacity: self.subscriber_capacity,
            retry_delay: self.retry_delay(),
            max_frame_size: self.max_frame_size,
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_endpoint("poll_endpoint", &self.poll_endpoint)?;
        if let Some(publish) = &self.publish_endpoint {
            parse_endpoint("publish_endpoint", publish)?;
        }
        if self.subscriber_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "subscriber_capacity cannot be 0".into(),
            ));
        }
        check_frame_size(self.max_frame_size)
    }
}

/// Delivery settings for a [`Subscriber`](crate::Subscriber).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberOptions {
    /// Snapshots buffered before new ones are discarded
    pub capacity: usize,
    /// Pause before retrying after a receive failure
    pub retry_delay: Duration,
    /// Maximum frame size accepted from the publisher
    pub max_frame_size: usize,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            capacity: default_subscriber_capacity(),
            retry_delay: Duration::from_millis(default_retry_delay()),
            max_frame_size: default_max_frame_size(),
        }
    }
}

/// Frame lengths travel as a 4-byte prefix.
fn check_frame_size(max_frame_size: usize) -> Result<(), ConfigError> {
    if max_frame_size == 0 {
        return Err(ConfigError::InvalidValue(
            "max_frame_size cannot be 0".into(),
        ));
    }
    if max_frame_size > u32::MAX as usize {
        return Err(ConfigError::InvalidValue(format!(
            "max_frame_size cannot exceed {}",
            u32::MAX
        )));
    }
    Ok(())
}

fn parse_endpoint(field: &str, value: &str) -> Result<Endpoint, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", field, e)))
}

/// Configuration error types.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
