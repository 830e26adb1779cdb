//! Bounded queue of pending refreshes drained by a fixed set of workers.

use std::sync::Arc;

use anyhow::Result;
use metrics::counter;
use tokio::{
    sync::{
        Mutex,
        mpsc::{
            self,
            error::TrySendError,
        },
    },
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::refresher::HashRefresher;

/// Handle used to submit refreshes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RefreshQueue {
    tx: mpsc::Sender<String>,
}

/// Receiving half of the queue, consumed by [`listen_for_refreshes`].
pub type RefreshReceiver = mpsc::Receiver<String>;

impl RefreshQueue {
    pub fn new(capacity: usize) -> (Self, RefreshReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues a refresh without waiting. Returns `false` when the
    /// submission was shed because the queue is full or closed.
    pub fn submit(&self, token: String) -> bool {
        match self.tx.try_send(token) {
            Ok(()) => {
                counter!("refresh_queue_submitted_total").increment(1);
                true
            }
            Err(TrySendError::Full(token)) => {
                tracing::warn!(target: "refresh_queue", %token, "Refresh queue full, dropping refresh");
                counter!("refresh_queue_shed_total").increment(1);
                false
            }
            Err(TrySendError::Closed(token)) => {
                tracing::debug!(target: "refresh_queue", %token, "Refresh queue closed, dropping refresh");
                false
            }
        }
    }
}

/// Runs `workers` tasks that pull tokens off the queue and refresh them,
/// until either the token is cancelled or every sender is dropped.
pub async fn listen_for_refreshes(
    rx: RefreshReceiver,
    refresher: Arc<HashRefresher>,
    workers: usize,
    cancel_token: CancellationToken,
) -> Result<()> {
    let rx = Arc::new(Mutex::new(rx));
    let mut tasks = JoinSet::new();

    for worker in 0..workers.max(1) {
        let rx = rx.clone();
        let refresher = refresher.clone();
        let cancel_token = cancel_token.clone();

        tasks.spawn(async move {
            loop {
                let next = tokio::select! {
                    () = cancel_token.cancelled() => break,
                    next = async { rx.lock().await.recv().await } => next,
                };
                let Some(token) = next else {
                    break;
                };
                refresher.refresh(&token).await;
            }
            tracing::debug!(target: "refresh_queue", worker, "Refresh worker stopped");
        });
    }

    while let Some(res) = tasks.join_next().await {
        res?;
    }
    tracing::info!(target: "refresh_queue", "Refresh workers stopped");
    Ok(())
}
