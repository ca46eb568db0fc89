// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP implementation of the survey and publish/subscribe capabilities.
//!
//! The coordinator side listens, participants and observers dial:
//!
//! ```text
//!   TcpSurveyor  (listen) <---- TcpRespondent  (dial)   poll endpoint
//!   TcpPublisher (listen) <---- TcpSubscriber  (dial)   publish endpoint
//! ```
//!
//! Each accepted connection is served by its own task; the listener-side
//! handle talks to those tasks through channels only. Dropping the handle
//! stops the accept loop and every connection task.

use super::frame::{read_frame, write_frame};
use super::{
    BroadcastSink, BroadcastSource, Endpoint, Result, SurveyInitiator, SurveyRespondent,
    TransportError,
};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Messages buffered per connection before a slow peer starts skipping.
const FANOUT_DEPTH: usize = 64;

/// Replies buffered between the connection tasks and the surveyor.
const REPLY_QUEUE_DEPTH: usize = 1024;

async fn bind(endpoint: &Endpoint) -> Result<(TcpListener, Endpoint)> {
    let listener = TcpListener::bind(endpoint.address()).await?;
    let local = endpoint.with_port(listener.local_addr()?.port());
    Ok((listener, local))
}

async fn connect(endpoint: &Endpoint) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect(endpoint.address()).await?;
    stream.set_nodelay(true)?;
    Ok(stream.into_split())
}

fn spawn_accept_loop<F, Fut>(
    listener: TcpListener,
    role: &'static str,
    cancel: CancellationToken,
    serve: F,
) where
    F: Fn(TcpStream, SocketAddr, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("{}: new connection from {}", role, peer_addr);
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("{}: cannot set TCP_NODELAY for {}: {}", role, peer_addr, e);
                            }
                            tokio::spawn(serve(stream, peer_addr, cancel.clone()));
                        }
                        Err(e) => {
                            warn!("{}: accept error: {}", role, e);
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("{}: accept loop shutting down", role);
                    break;
                }
            }
        }
    });
}

/// Coordinator side of the survey pattern.
pub struct TcpSurveyor {
    local: Endpoint,
    polls: broadcast::Sender<Vec<u8>>,
    replies: mpsc::Receiver<Vec<u8>>,
    survey_timeout: Duration,
    deadline: Option<Instant>,
    _shutdown: DropGuard,
}

impl TcpSurveyor {
    /// Bind the poll endpoint and start accepting respondents.
    pub async fn listen(
        endpoint: &Endpoint,
        survey_timeout: Duration,
        max_frame_size: usize,
    ) -> Result<Self> {
        let (listener, local) = bind(endpoint).await?;
        info!("Poll endpoint listening on {}", local);

        let (polls, _) = broadcast::channel(FANOUT_DEPTH);
        let (reply_tx, replies) = mpsc::channel(REPLY_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let poll_tx = polls.clone();
        spawn_accept_loop(
            listener,
            "surveyor",
            cancel.clone(),
            move |stream, peer_addr, cancel| {
                serve_respondent(
                    stream,
                    peer_addr,
                    poll_tx.subscribe(),
                    reply_tx.clone(),
                    max_frame_size,
                    cancel,
                )
            },
        );

        Ok(Self {
            local,
            polls,
            replies,
            survey_timeout,
            deadline: None,
            _shutdown: cancel.drop_guard(),
        })
    }

    /// The endpoint actually bound (port 0 resolved).
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    /// Number of respondents currently connected.
    pub fn respondent_count(&self) -> usize {
        self.polls.receiver_count()
    }
}

async fn serve_respondent(
    stream: TcpStream,
    peer_addr: SocketAddr,
    mut polls: broadcast::Receiver<Vec<u8>>,
    replies: mpsc::Sender<Vec<u8>>,
    max_frame_size: usize,
    cancel: CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();

    let inbound = async {
        loop {
            match read_frame(&mut reader, max_frame_size).await {
                Ok(Some(reply)) => {
                    if replies.send(reply).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Respondent {} disconnected", peer_addr);
                    break;
                }
                Err(e) => {
                    warn!("Read error from respondent {}: {}", peer_addr, e);
                    break;
                }
            }
        }
    };

    let outbound = async {
        loop {
            match polls.recv().await {
                Ok(poll) => {
                    if let Err(e) = write_frame(&mut writer, &poll, max_frame_size).await {
                        warn!("Failed to send poll to {}: {}", peer_addr, e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Respondent {} skipped {} poll(s)", peer_addr, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    tokio::select! {
        _ = inbound => {}
        _ = outbound => {}
        _ = cancel.cancelled() => {}
    }
}

#[async_trait]
impl SurveyInitiator for TcpSurveyor {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        match self.polls.send(payload.to_vec()) {
            Ok(count) => debug!("Poll sent to {} respondent(s)", count),
            Err(_) => debug!("Poll sent with no respondent connected"),
        }
        self.deadline = Some(Instant::now() + self.survey_timeout);
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = self.deadline.ok_or(TransportError::NoSurvey)?;
        let now = Instant::now();
        if now >= deadline {
            return Err(TransportError::Timeout);
        }

        match tokio::time::timeout_at(deadline.min(now + timeout), self.replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Outgoing connection that re-dials after the peer goes away.
struct Link {
    endpoint: Endpoint,
    max_frame_size: usize,
    halves: Option<(OwnedReadHalf, OwnedWriteHalf)>,
}

impl Link {
    async fn dial(endpoint: &Endpoint, max_frame_size: usize) -> Result<Self> {
        let halves = connect(endpoint).await?;
        Ok(Self {
            endpoint: endpoint.clone(),
            max_frame_size,
            halves: Some(halves),
        })
    }

    async fn halves(&mut self) -> Result<&mut (OwnedReadHalf, OwnedWriteHalf)> {
        let halves = match self.halves.take() {
            Some(halves) => halves,
            None => {
                debug!("Re-dialing {}", self.endpoint);
                connect(&self.endpoint).await?
            }
        };
        Ok(self.halves.insert(halves))
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        let max_frame_size = self.max_frame_size;
        let (reader, _) = self.halves().await?;
        match read_frame(reader, max_frame_size).await {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => {
                self.halves = None;
                Err(TransportError::Closed)
            }
            Err(e) => {
                self.halves = None;
                Err(e)
            }
        }
    }

    async fn write(&mut self, payload: &[u8]) -> Result<()> {
        let max_frame_size = self.max_frame_size;
        let (_, writer) = self.halves().await?;
        match write_frame(writer, payload, max_frame_size).await {
            Err(TransportError::Io(e)) => {
                self.halves = None;
                Err(TransportError::Io(e))
            }
            other => other,
        }
    }
}

/// Participant side of the survey pattern.
pub struct TcpRespondent {
    link: Link,
}

impl TcpRespondent {
    /// Dial the coordinator's poll endpoint.
    ///
    /// The first connection must succeed; later disconnects are re-dialed by
    /// the next `recv`.
    pub async fn dial(endpoint: &Endpoint, max_frame_size: usize) -> Result<Self> {
        let link = Link::dial(endpoint, max_frame_size).await?;
        debug!("Respondent connected to {}", endpoint);
        Ok(Self { link })
    }
}

#[async_trait]
impl SurveyRespondent for TcpRespondent {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        self.link.read().await
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.link.write(payload).await
    }
}

/// Publishing side of the fan-out pattern.
pub struct TcpPublisher {
    local: Endpoint,
    messages: broadcast::Sender<Vec<u8>>,
    _shutdown: DropGuard,
}

impl TcpPublisher {
    /// Bind the publish endpoint and start accepting subscribers.
    pub async fn listen(endpoint: &Endpoint, max_frame_size: usize) -> Result<Self> {
        let (listener, local) = bind(endpoint).await?;
        info!("Publish endpoint listening on {}", local);

        let (messages, _) = broadcast::channel(FANOUT_DEPTH);
        let cancel = CancellationToken::new();

        let message_tx = messages.clone();
        spawn_accept_loop(
            listener,
            "publisher",
            cancel.clone(),
            move |stream, peer_addr, cancel| {
                serve_subscriber(
                    stream,
                    peer_addr,
                    message_tx.subscribe(),
                    max_frame_size,
                    cancel,
                )
            },
        );

        Ok(Self {
            local,
            messages,
            _shutdown: cancel.drop_guard(),
        })
    }

    /// The endpoint actually bound (port 0 resolved).
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    /// Number of subscribers currently connected.
    pub fn subscriber_count(&self) -> usize {
        self.messages.receiver_count()
    }
}

async fn serve_subscriber(
    stream: TcpStream,
    peer_addr: SocketAddr,
    mut messages: broadcast::Receiver<Vec<u8>>,
    max_frame_size: usize,
    cancel: CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();

    // Subscribers never write; reading only detects the disconnect.
    let closed = async {
        let mut scratch = [0u8; 64];
        loop {
            match reader.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        debug!("Subscriber {} disconnected", peer_addr);
    };

    let outbound = async {
        loop {
            match messages.recv().await {
                Ok(message) => {
                    if let Err(e) = write_frame(&mut writer, &message, max_frame_size).await {
                        warn!("Failed to publish to {}: {}", peer_addr, e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber {} lagging, skipped {} message(s)", peer_addr, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    tokio::select! {
        _ = closed => {}
        _ = outbound => {}
        _ = cancel.cancelled() => {}
    }
}

#[async_trait]
impl BroadcastSink for TcpPublisher {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        match self.messages.send(payload.to_vec()) {
            Ok(count) => debug!("Published {} bytes to {} subscriber(s)", payload.len(), count),
            Err(_) => debug!("Published with no subscriber connected"),
        }
        Ok(())
    }
}

/// Subscribing side of the fan-out pattern.
pub struct TcpSubscriber {
    link: Link,
}

impl TcpSubscriber {
    /// Dial the coordinator's publish endpoint.
    ///
    /// The first connection must succeed; later disconnects are re-dialed by
    /// the next `recv`.
    pub async fn dial(endpoint: &Endpoint, max_frame_size: usize) -> Result<Self> {
        let link = Link::dial(endpoint, max_frame_size).await?;
        debug!("Subscriber connected to {}", endpoint);
        Ok(Self { link })
    }
}

#[async_trait]
impl BroadcastSource for TcpSubscriber {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        self.link.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    fn loopback() -> Endpoint {
        "tcp://127.0.0.1:0".parse().unwrap()
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_listen_resolves_port() {
        let surveyor = TcpSurveyor::listen(&loopback(), Duration::from_millis(50), MAX)
            .await
            .unwrap();
        assert_ne!(surveyor.local_endpoint().port(), 0);
        assert_eq!(surveyor.local_endpoint().host(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_recv_before_send_is_no_survey() {
        let mut surveyor = TcpSurveyor::listen(&loopback(), Duration::from_millis(50), MAX)
            .await
            .unwrap();
        let err = surveyor.recv(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, TransportError::NoSurvey));
    }

    #[tokio::test]
    async fn test_survey_round_trip() {
        let mut surveyor = TcpSurveyor::listen(&loopback(), Duration::from_millis(500), MAX)
            .await
            .unwrap();
        let endpoint = surveyor.local_endpoint().clone();

        let mut respondent = TcpRespondent::dial(&endpoint, MAX).await.unwrap();
        wait_for(|| surveyor.respondent_count() == 1).await;

        surveyor.send(b"").await.unwrap();
        let poll = respondent.recv().await.unwrap();
        assert!(poll.is_empty());

        respondent.send(b"client1").await.unwrap();
        let reply = surveyor.recv(Duration::from_millis(200)).await.unwrap();
        assert_eq!(reply, b"client1");

        let err = surveyor.recv(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_survey_deadline_caps_receive_timeout() {
        let mut surveyor = TcpSurveyor::listen(&loopback(), Duration::from_millis(30), MAX)
            .await
            .unwrap();
        surveyor.send(b"").await.unwrap();

        let started = Instant::now();
        let err = surveyor.recv(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let endpoint = {
            let surveyor = TcpSurveyor::listen(&loopback(), Duration::from_millis(50), MAX)
                .await
                .unwrap();
            surveyor.local_endpoint().clone()
        };
        // Give the accept loop a moment to release the port.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(TcpRespondent::dial(&endpoint, MAX).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_fan_out() {
        let mut publisher = TcpPublisher::listen(&loopback(), MAX).await.unwrap();
        let endpoint = publisher.local_endpoint().clone();

        let mut first = TcpSubscriber::dial(&endpoint, MAX).await.unwrap();
        let mut second = TcpSubscriber::dial(&endpoint, MAX).await.unwrap();
        wait_for(|| publisher.subscriber_count() == 2).await;

        publisher.send(b"client1|client2").await.unwrap();
        assert_eq!(first.recv().await.unwrap(), b"client1|client2");
        assert_eq!(second.recv().await.unwrap(), b"client1|client2");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let mut publisher = TcpPublisher::listen(&loopback(), MAX).await.unwrap();
        assert!(publisher.send(b"client1").await.is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_sees_closed_when_publisher_dropped() {
        let publisher = TcpPublisher::listen(&loopback(), MAX).await.unwrap();
        let endpoint = publisher.local_endpoint().clone();
        let mut subscriber = TcpSubscriber::dial(&endpoint, MAX).await.unwrap();
        wait_for(|| publisher.subscriber_count() == 1).await;

        drop(publisher);
        let err = subscriber.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed | TransportError::Io(_)));
    }
}
