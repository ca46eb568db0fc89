// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Membership change subscriber.
//!
//! A subscriber task reads snapshots from the publish endpoint and hands them
//! to the consumer through a bounded buffer. The task never waits on the
//! consumer: when the buffer is full the incoming snapshot is discarded.

use crate::config::SubscriberOptions;
use crate::error::DiscoveryError;
use crate::membership::Snapshot;
use crate::transport::{BroadcastSource, Endpoint, TcpSubscriber};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Receiving side of a subscription.
///
/// Yields snapshots in the order they were accepted. End of stream means the
/// subscriber was cancelled.
#[derive(Debug)]
pub struct Changes {
    rx: mpsc::Receiver<Snapshot>,
}

impl Changes {
    /// Wait for the next snapshot. `None` once the subscriber has stopped and
    /// the buffer is drained.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Take a buffered snapshot without waiting.
    pub fn try_recv(&mut self) -> Result<Snapshot, TryRecvError> {
        self.rx.try_recv()
    }
}

/// Running subscription to a coordinator's publish endpoint.
///
/// Dropping the subscriber cancels it.
pub struct Subscriber {
    changes: Changes,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl Subscriber {
    /// Dial `publish_endpoint` and start receiving.
    ///
    /// The subscriber lives in a child scope of `parent`: cancelling `parent`
    /// stops it, cancelling the subscriber leaves `parent` alone.
    pub async fn connect(
        publish_endpoint: &str,
        parent: &CancellationToken,
        options: SubscriberOptions,
    ) -> Result<Self, DiscoveryError> {
        let endpoint: Endpoint = publish_endpoint.parse()?;
        let source = TcpSubscriber::dial(&endpoint, options.max_frame_size).await?;
        info!("Subscribed to {}", endpoint);
        Ok(Self::spawn(source, parent.child_token(), options))
    }

    /// Start receiving from a caller-supplied source under `cancel`.
    pub fn spawn<B>(source: B, cancel: CancellationToken, options: SubscriberOptions) -> Self
    where
        B: BroadcastSource + 'static,
    {
        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        let task = tokio::spawn(run(source, tx, cancel.clone(), options));
        Self {
            changes: Changes { rx },
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    pub fn changes(&mut self) -> &mut Changes {
        &mut self.changes
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the receive task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Subscriber task ended abnormally: {}", e);
        }
    }
}

async fn run<B: BroadcastSource>(
    mut source: B,
    tx: mpsc::Sender<Snapshot>,
    cancel: CancellationToken,
    options: SubscriberOptions,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = source.recv() => received,
        };

        match received {
            Ok(payload) => {
                let snapshot = Snapshot::decode(&payload);
                match tx.try_send(snapshot) {
                    Ok(()) => debug!("Membership update buffered"),
                    Err(TrySendError::Full(snapshot)) => {
                        debug!("Buffer full, discarding membership {}", snapshot);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Consumer gone, stopping subscriber");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Cannot receive membership update: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(options.retry_delay) => {}
                }
            }
        }
    }

    drop(source);
    drop(tx);
    debug!("Subscriber stopped");
}
