// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery coordinator.
//!
//! Every tick the coordinator broadcasts an empty poll, collects replies until
//! the reply timeout passes without a new one, and compares the answering
//! identities with the previous round. Only a real change is handed to the
//! [`Publisher`]; observers never see a no-op round.
//!
//! Rounds carry no identifier. A reply that arrives after its round closed is
//! counted in the next round, so membership may briefly lag by one round.

use crate::config::ServerConfig;
use crate::error::DiscoveryError;
use crate::membership::MembershipSet;
use crate::transport::{
    BroadcastSink, Endpoint, SurveyInitiator, TcpPublisher, TcpSurveyor, TransportError,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

pub mod publisher;

pub use publisher::Publisher;

/// Running discovery coordinator and its publisher.
///
/// Dropping the server cancels it, like [`DiscoveryServer::cancel`].
pub struct DiscoveryServer {
    cancel: CancellationToken,
    poll_endpoint: Option<Endpoint>,
    publish_endpoint: Option<Endpoint>,
    coordinator: JoinHandle<()>,
    publisher: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl DiscoveryServer {
    /// Bind both endpoints over TCP and start polling.
    ///
    /// The publish endpoint is bound first. Any failure is returned before a
    /// poll is ever sent.
    pub async fn bind(config: ServerConfig) -> Result<Self, DiscoveryError> {
        config.validate()?;
        let poll: Endpoint = config.poll_endpoint.parse()?;
        let publish: Endpoint = config.publish_endpoint.parse()?;

        let sink = TcpPublisher::listen(&publish, config.max_frame_size).await?;
        let surveyor =
            TcpSurveyor::listen(&poll, config.survey_timeout(), config.max_frame_size).await?;

        let poll_endpoint = surveyor.local_endpoint().clone();
        let publish_endpoint = sink.local_endpoint().clone();

        let mut server = Self::start(surveyor, sink, &config);
        server.poll_endpoint = Some(poll_endpoint);
        server.publish_endpoint = Some(publish_endpoint);
        Ok(server)
    }

    /// Start polling over caller-supplied transports.
    ///
    /// Only the timing fields of `config` are used.
    pub fn start<S, B>(surveyor: S, sink: B, config: &ServerConfig) -> Self
    where
        S: SurveyInitiator + 'static,
        B: BroadcastSink + 'static,
    {
        let cancel = CancellationToken::new();
        let (publisher, publisher_task) = Publisher::spawn(sink, cancel.child_token());

        let coordinator = Coordinator {
            surveyor,
            publisher,
            members: MembershipSet::new(),
            poll_interval: config.poll_interval(),
            reply_timeout: config.reply_timeout(),
            cancel: cancel.clone(),
        };
        let coordinator_task = tokio::spawn(coordinator.run());

        Self {
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            poll_endpoint: None,
            publish_endpoint: None,
            coordinator: coordinator_task,
            publisher: publisher_task,
        }
    }

    /// Endpoint participants dial, when bound by [`DiscoveryServer::bind`].
    pub fn poll_endpoint(&self) -> Option<&Endpoint> {
        self.poll_endpoint.as_ref()
    }

    /// Endpoint subscribers dial, when bound by [`DiscoveryServer::bind`].
    pub fn publish_endpoint(&self) -> Option<&Endpoint> {
        self.publish_endpoint.as_ref()
    }

    /// Stop polling and stop the publisher. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait until no task of this server is left running.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.coordinator.await {
            warn!("Coordinator task ended abnormally: {}", e);
        }
        if let Err(e) = self.publisher.await {
            warn!("Publisher task ended abnormally: {}", e);
        }
    }
}

/// State owned by the coordinator task. Nothing else touches `members`.
struct Coordinator<S> {
    surveyor: S,
    publisher: Publisher,
    members: MembershipSet,
    poll_interval: Duration,
    reply_timeout: Duration,
    cancel: CancellationToken,
}

impl<S: SurveyInitiator> Coordinator<S> {
    async fn run(mut self) {
        info!(
            "Discovery coordinator started (poll every {:?}, reply timeout {:?})",
            self.poll_interval, self.reply_timeout
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Some(round) = self.poll().await {
                        self.apply(round).await;
                    }
                }
            }
        }

        info!("Discovery coordinator stopped");
    }

    /// Run one survey. `None` if the round was abandoned.
    async fn poll(&mut self) -> Option<MembershipSet> {
        debug!("Sending poll");
        if let Err(e) = self.surveyor.send(&[]).await {
            warn!("Cannot send poll, skipping round: {}", e);
            return None;
        }

        let mut round = MembershipSet::new();
        loop {
            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                reply = self.surveyor.recv(self.reply_timeout) => reply,
            };

            match reply {
                Ok(payload) => {
                    let identity = String::from_utf8_lossy(&payload).into_owned();
                    if identity.is_empty() {
                        debug!("Ignoring empty reply");
                    } else if round.add(identity.clone()) {
                        debug!("Reply from {}", identity);
                    } else {
                        debug!("Duplicate reply from {}", identity);
                    }
                }
                Err(TransportError::Timeout) => {
                    debug!("Round closed with {} member(s)", round.len());
                    return Some(round);
                }
                Err(e) => {
                    warn!("Cannot receive reply: {}", e);
                }
            }
        }
    }

    async fn apply(&mut self, round: MembershipSet) {
        let added = round.difference(&self.members);
        let removed = self.members.difference(&round);
        if added.is_empty() && removed.is_empty() {
            debug!("Membership unchanged ({} member(s))", round.len());
            return;
        }

        info!(
            "Membership changed: added {:?}, removed {:?}",
            added.to_ordered_sequence(),
            removed.to_ordered_sequence()
        );
        self.members = round;
        self.publisher.publish(self.members.to_snapshot()).await;
    }
}
