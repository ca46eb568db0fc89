// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Change publisher.
//!
//! Owns the broadcast transport on a dedicated task. The coordinator hands
//! snapshots over a bounded queue and never touches the transport itself.

use crate::membership::Snapshot;
use crate::transport::BroadcastSink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Snapshots queued between the coordinator and the emit task.
const PUBLISH_QUEUE_DEPTH: usize = 16;

/// Handle used by the coordinator to publish snapshots.
pub struct Publisher {
    tx: mpsc::Sender<Snapshot>,
    cancel: CancellationToken,
}

impl Publisher {
    /// Start the emit task. It exits when `cancel` fires.
    pub fn spawn<B>(sink: B, cancel: CancellationToken) -> (Self, JoinHandle<()>)
    where
        B: BroadcastSink + 'static,
    {
        let (tx, rx) = mpsc::channel(PUBLISH_QUEUE_DEPTH);
        let task = tokio::spawn(run(sink, rx, cancel.clone()));
        (Self { tx, cancel }, task)
    }

    /// Queue a snapshot for emission.
    ///
    /// Returns `false` if the publisher has shut down; the snapshot is then
    /// dropped without waiting.
    pub async fn publish(&self, snapshot: Snapshot) -> bool {
        if self.cancel.is_cancelled() {
            debug!("Publisher stopped, dropping snapshot {}", snapshot);
            return false;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Publisher stopped while queueing, snapshot dropped");
                false
            }
            result = self.tx.send(snapshot) => {
                match result {
                    Ok(()) => true,
                    Err(mpsc::error::SendError(snapshot)) => {
                        debug!("Publisher task gone, dropping snapshot {}", snapshot);
                        false
                    }
                }
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

async fn run<B: BroadcastSink>(
    mut sink: B,
    mut rx: mpsc::Receiver<Snapshot>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => {
                let Some(snapshot) = next else { break };
                info!("Publishing membership {}", snapshot);
                if let Err(e) = sink.send(&snapshot.encode()).await {
                    warn!("Failed publishing membership: {}", e);
                }
            }
        }
    }

    rx.close();
    drop(sink);
    debug!("Publisher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ChannelSink;
    use crate::transport::{Result as TransportResult, TransportError};
    use async_trait::async_trait;
    use std::time::Duration;

    fn snapshot(ids: &[&str]) -> Snapshot {
        Snapshot::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_publish_encodes_snapshot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (publisher, task) = Publisher::spawn(ChannelSink { tx, fail: false }, cancel.clone());

        assert!(publisher.publish(snapshot(&["client1", "client2"])).await);
        assert!(publisher.publish(snapshot(&[])).await);

        assert_eq!(rx.recv().await.unwrap(), b"client1|client2");
        assert_eq!(rx.recv().await.unwrap(), b"");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_after_cancel_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (publisher, task) = Publisher::spawn(ChannelSink { tx, fail: false }, cancel.clone());

        cancel.cancel();
        task.await.unwrap();

        assert!(publisher.is_stopped());
        assert!(!publisher.publish(snapshot(&["late"])).await);
        // The task released the sink, so the channel is closed and empty.
        assert!(rx.recv().await.is_none());
    }

    /// Fails the first send, forwards the rest.
    struct FlakySink {
        failed: bool,
        tx: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait]
    impl BroadcastSink for FlakySink {
        async fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
            if !self.failed {
                self.failed = true;
                return Err(TransportError::Closed);
            }
            self.tx.send(payload.to_vec()).map_err(|_| TransportError::Closed)
        }
    }

    #[tokio::test]
    async fn test_send_failure_is_not_retried() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (publisher, task) =
            Publisher::spawn(FlakySink { failed: false, tx }, cancel.clone());

        assert!(publisher.publish(snapshot(&["lost"])).await);
        assert!(publisher.publish(snapshot(&["kept"])).await);

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, b"kept");

        cancel.cancel();
        task.await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
