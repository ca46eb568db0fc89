// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery participant.
//!
//! A [`DiscoveryClient`] always answers polls. With a publish endpoint it also
//! owns a [`Subscriber`] and exposes the membership changes through
//! [`DiscoveryClient::peers`].

use crate::config::{ClientConfig, SubscriberOptions};
use crate::error::{DiscoveryError, Result};
use crate::transport::{BroadcastSource, Endpoint, SurveyRespondent, TcpRespondent};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

pub mod responder;
pub mod subscriber;

pub use responder::Responder;
pub use subscriber::{Changes, Subscriber};

/// Participant in a discovery domain.
///
/// Dropping the client cancels it.
pub struct DiscoveryClient {
    identity: String,
    cancel: CancellationToken,
    responder: JoinHandle<()>,
    subscriber: Option<Subscriber>,
    _cancel_on_drop: DropGuard,
}

impl DiscoveryClient {
    /// Dial the coordinator and start answering polls.
    ///
    /// The publish endpoint, if any, is dialed first.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        if config.identity.is_empty() {
            return Err(DiscoveryError::InvalidIdentity);
        }
        config.validate()?;

        let cancel = CancellationToken::new();
        let subscriber = match &config.publish_endpoint {
            Some(publish) => {
                Some(Subscriber::connect(publish, &cancel, config.subscriber_options()).await?)
            }
            None => None,
        };

        let poll: Endpoint = config.poll_endpoint.parse()?;
        let respondent = TcpRespondent::dial(&poll, config.max_frame_size).await?;
        info!("Joined {} as {}", poll, config.identity);

        let responder = Responder::spawn(
            respondent,
            config.identity.clone(),
            cancel.clone(),
            config.retry_delay(),
        );

        Ok(Self {
            identity: config.identity,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            responder,
            subscriber,
        })
    }

    /// Answer polls on `poll_endpoint` without observing membership.
    pub async fn join(poll_endpoint: &str, identity: &str) -> Result<Self> {
        Self::connect(ClientConfig::new(poll_endpoint, identity)).await
    }

    /// Answer polls and observe membership changes.
    pub async fn join_with_subscriber(
        poll_endpoint: &str,
        publish_endpoint: &str,
        identity: &str,
    ) -> Result<Self> {
        Self::connect(ClientConfig::new(poll_endpoint, identity).with_subscriber(publish_endpoint))
            .await
    }

    /// Build a client over caller-supplied transports.
    pub fn from_parts<R, B>(
        respondent: R,
        identity: impl Into<String>,
        subscriber_source: Option<B>,
        options: SubscriberOptions,
    ) -> Result<Self>
    where
        R: SurveyRespondent + 'static,
        B: BroadcastSource + 'static,
    {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(DiscoveryError::InvalidIdentity);
        }

        let cancel = CancellationToken::new();
        let subscriber = subscriber_source
            .map(|source| Subscriber::spawn(source, cancel.child_token(), options));
        let responder = Responder::spawn(
            respondent,
            identity.clone(),
            cancel.clone(),
            options.retry_delay,
        );

        Ok(Self {
            identity,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            responder,
            subscriber,
        })
    }

    /// Membership changes seen by this client.
    ///
    /// Fails with [`DiscoveryError::NoSubscription`] if the client was built
    /// without a publish endpoint.
    pub fn peers(&mut self) -> Result<&mut Changes> {
        self.subscriber
            .as_mut()
            .map(Subscriber::changes)
            .ok_or(DiscoveryError::NoSubscription)
    }

    /// Alias of [`DiscoveryClient::peers`].
    pub fn nodes(&mut self) -> Result<&mut Changes> {
        self.peers()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn has_subscription(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Stop answering polls and stop the owned subscriber.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for every task of this client.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.responder.await {
            warn!("Responder task ended abnormally: {}", e);
        }
        if let Some(subscriber) = self.subscriber {
            subscriber.shutdown().await;
        }
    }
}
