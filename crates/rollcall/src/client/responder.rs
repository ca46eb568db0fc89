// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant responder: answers every poll with the client identity.

use crate::transport::SurveyRespondent;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Responder;

impl Responder {
    /// Start answering polls on `respondent` until `cancel` fires.
    pub fn spawn<R>(
        respondent: R,
        identity: String,
        cancel: CancellationToken,
        retry_delay: Duration,
    ) -> JoinHandle<()>
    where
        R: SurveyRespondent + 'static,
    {
        tokio::spawn(run(respondent, identity, cancel, retry_delay))
    }
}

async fn run<R: SurveyRespondent>(
    mut respondent: R,
    identity: String,
    cancel: CancellationToken,
    retry_delay: Duration,
) {
    loop {
        let poll = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            poll = respondent.recv() => poll,
        };

        match poll {
            Ok(_) => {
                // A poll racing with cancellation is not answered.
                if cancel.is_cancelled() {
                    break;
                }
                match respondent.send(identity.as_bytes()).await {
                    Ok(()) => debug!("Answered poll as {}", identity),
                    Err(e) => warn!("Cannot answer poll: {}", e),
                }
            }
            Err(e) => {
                warn!("Cannot receive poll: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }

    debug!("Responder {} stopped", identity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ChannelRespondent;
    use crate::transport::Result as TransportResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    const RETRY: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_answers_each_poll() {
        let (poll_tx, polls) = mpsc::unbounded_channel();
        let (replies, mut reply_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = Responder::spawn(
            ChannelRespondent { polls, replies },
            "client1".to_string(),
            cancel.clone(),
            RETRY,
        );

        poll_tx.send(Vec::new()).unwrap();
        poll_tx.send(Vec::new()).unwrap();
        assert_eq!(reply_rx.recv().await.unwrap(), b"client1");
        assert_eq!(reply_rx.recv().await.unwrap(), b"client1");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_replies() {
        let (poll_tx, polls) = mpsc::unbounded_channel();
        let (replies, mut reply_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = Responder::spawn(
            ChannelRespondent { polls, replies },
            "client1".to_string(),
            cancel.clone(),
            RETRY,
        );

        cancel.cancel();
        task.await.unwrap();

        // The task is gone, so the poll is never answered.
        let _ = poll_tx.send(Vec::new());
        assert!(reply_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_receive_error_is_retried() {
        let (poll_tx, polls) = mpsc::unbounded_channel::<Vec<u8>>();
        let (replies, mut reply_rx) = mpsc::unbounded_channel();
        drop(poll_tx);
        let cancel = CancellationToken::new();
        let task = Responder::spawn(
            ChannelRespondent { polls, replies },
            "client1".to_string(),
            cancel.clone(),
            RETRY,
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished());
        assert!(reply_rx.try_recv().is_err());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    /// Delivers a poll but fires the cancellation while doing so.
    struct CancelledMidPoll {
        cancel: CancellationToken,
        sends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SurveyRespondent for CancelledMidPoll {
        async fn recv(&mut self) -> TransportResult<Vec<u8>> {
            self.cancel.cancel();
            Ok(Vec::new())
        }

        async fn send(&mut self, _payload: &[u8]) -> TransportResult<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_poll_received_during_cancel_is_not_answered() {
        let cancel = CancellationToken::new();
        let sends = Arc::new(AtomicUsize::new(0));
        let task = Responder::spawn(
            CancelledMidPoll {
                cancel: cancel.clone(),
                sends: sends.clone(),
            },
            "client1".to_string(),
            cancel.clone(),
            RETRY,
        );

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }
}
