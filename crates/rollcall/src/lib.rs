// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rollcall membership discovery
//!
//! A coordinator polls every connected participant at a fixed interval,
//! works out which identities answered, and publishes the membership set to
//! subscribers whenever it changes.
//!
//! # Features
//!
//! - **Survey polling**: participants answer each poll with their identity
//! - **Change-only publishing**: unchanged rounds are never broadcast
//! - **Lossy delivery**: each subscriber buffers a bounded number of
//!   snapshots and discards new ones when full
//! - **Cancellation trees**: stopping a server or client stops everything it
//!   owns
//!
//! # Quick Start
//!
//! ```no_run
//! use rollcall::{DiscoveryClient, DiscoveryServer, ServerConfig};
//!
//! # async fn example() -> Result<(), rollcall::DiscoveryError> {
//! let server = DiscoveryServer::bind(ServerConfig::default()).await?;
//!
//! let mut client = DiscoveryClient::join_with_subscriber(
//!     "tcp://127.0.0.1:40007",
//!     "tcp://127.0.0.1:50007",
//!     "node-a",
//! )
//! .await?;
//!
//! if let Some(snapshot) = client.peers()?.recv().await {
//!     println!("members: {}", snapshot);
//! }
//!
//! client.shutdown().await;
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Wire format
//!
//! Polls are empty frames, replies carry the raw identity, and published
//! snapshots are the identities joined with `|`. An empty snapshot is an
//! empty frame.

pub mod client;
pub mod config;
pub mod error;
pub mod membership;
pub mod server;
pub mod transport;

pub use client::{Changes, DiscoveryClient, Responder, Subscriber};
pub use config::{ClientConfig, ConfigError, ServerConfig, SubscriberOptions};
pub use error::{DiscoveryError, Result};
pub use membership::{MembershipSet, Snapshot, IDENTITY_DELIMITER};
pub use server::{DiscoveryServer, Publisher};
pub use transport::{
    BroadcastSink, BroadcastSource, Endpoint, SurveyInitiator, SurveyRespondent, TransportError,
};
