//! Periodic refresh of every live subscription.

use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    queue::RefreshQueue,
    registry::SubscriptionRegistry,
};

/// Submits one refresh per live token. Returns how many were accepted.
pub fn sweep_once(registry: &SubscriptionRegistry, queue: &RefreshQueue) -> usize {
    let tokens = registry.all_tokens();
    let total = tokens.len();
    let accepted = tokens
        .into_iter()
        .filter(|token| queue.submit(token.clone()))
        .count();

    if accepted < total {
        tracing::warn!(target: "sweep", total, accepted, "Sweep could not enqueue every subscription");
    } else {
        tracing::debug!(target: "sweep", total, "Sweep enqueued refreshes");
    }
    metrics::counter!("sweep_runs_total").increment(1);
    accepted
}

/// Runs [`sweep_once`] every `interval` until cancelled.
pub async fn run_sweep(
    registry: Arc<SubscriptionRegistry>,
    queue: RefreshQueue,
    interval: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                tracing::info!(target: "sweep", "Sweep received cancellation signal, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                sweep_once(&registry, &queue);
            }
        }
    }

    Ok(())
}
