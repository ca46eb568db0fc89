// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Top-level error type.

use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors surfaced to callers of the discovery API.
///
/// Only construction and usage mistakes end up here. Failures inside the
/// running poll, publish, respond and subscribe loops are logged instead.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Identity must not be empty")]
    InvalidIdentity,

    #[error("No publish endpoint was configured, peers cannot be observed")]
    NoSubscription,
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
