// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport capabilities consumed by the discovery core.
//!
//! Two messaging patterns are needed:
//!
//! - **Survey**: the coordinator broadcasts a poll to every connected
//!   respondent and collects their replies ([`SurveyInitiator`],
//!   [`SurveyRespondent`]).
//! - **Publish/subscribe**: the coordinator fans membership snapshots out to
//!   every connected subscriber ([`BroadcastSink`], [`BroadcastSource`]).
//!
//! Every message is a single opaque byte string. The [`tcp`] module provides
//! the concrete implementation used by [`DiscoveryServer::bind`] and
//! [`DiscoveryClient::connect`].
//!
//! [`DiscoveryServer::bind`]: crate::DiscoveryServer::bind
//! [`DiscoveryClient::connect`]: crate::DiscoveryClient::connect

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod endpoint;
pub mod frame;
pub mod tcp;

pub use endpoint::Endpoint;
pub use tcp::{TcpPublisher, TcpRespondent, TcpSubscriber, TcpSurveyor};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// No reply arrived within the receive timeout or the survey expired.
    #[error("Receive timed out")]
    Timeout,

    #[error("No survey in progress")]
    NoSurvey,

    #[error("Connection closed")]
    Closed,

    #[error("Frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Coordinator side of a survey.
#[async_trait]
pub trait SurveyInitiator: Send {
    /// Broadcast a poll to every connected respondent and start a new survey.
    async fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Wait for the next reply.
    ///
    /// Returns [`TransportError::Timeout`] once `timeout` passes without a
    /// reply or the survey itself expires.
    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>>;
}

/// Participant side of a survey.
#[async_trait]
pub trait SurveyRespondent: Send {
    /// Wait for the next poll.
    async fn recv(&mut self) -> Result<Vec<u8>>;

    /// Answer the poll most recently received.
    async fn send(&mut self, payload: &[u8]) -> Result<()>;
}

/// Publishing side of a fan-out channel.
#[async_trait]
pub trait BroadcastSink: Send {
    async fn send(&mut self, payload: &[u8]) -> Result<()>;
}

/// Subscribing side of a fan-out channel.
#[async_trait]
pub trait BroadcastSource: Send {
    /// Wait for the next published message.
    async fn recv(&mut self) -> Result<Vec<u8>>;
}
