use std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};

use metrics::{
    counter,
    histogram,
};
use sha2::{
    Digest,
    Sha256,
};
use tokio_util::sync::CancellationToken;
use tracing::{
    debug,
    warn,
};
use txs_hash_core::{
    DEFAULT_PAGE,
    DEFAULT_PER_PAGE,
};
use ud_txs_client::{
    TransactionsSource,
    TxsClientError,
};

use crate::registry::SubscriptionRegistry;

/// Result of a single refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The hash was recomputed and written back.
    Updated(String),
    /// The subscription no longer exists.
    Missing,
    /// The upstream fetch failed; the previous hash is kept.
    Failed(String),
    /// Shutdown interrupted the upstream fetch.
    Cancelled,
}

/// Recomputes the cached hash of a subscription from the upstream payload.
pub struct HashRefresher {
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn TransactionsSource>,
    request_timeout: Duration,
    cancel_token: CancellationToken,
}

impl HashRefresher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn TransactionsSource>,
        request_timeout: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            source,
            request_timeout,
            cancel_token,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Refreshes the hash of `token`. Failures are absorbed; callers only
    /// ever observe a stale or absent hash.
    pub async fn refresh(&self, token: &str) {
        let _ = self.refresh_outcome(token).await;
    }

    #[tracing::instrument(level = "debug", skip(self), target = "refresher::refresh")]
    pub async fn refresh_outcome(&self, token: &str) -> RefreshOutcome {
        // Copy what the fetch needs so no registry lock outlives this line.
        let Ok(record) = self.registry.find(token) else {
            debug!(target: "refresher", "Subscription is gone, skipping refresh");
            return RefreshOutcome::Missing;
        };
        self.registry.mark_requested(token);

        let started_at = Instant::now();
        let fetch = tokio::time::timeout(
            self.request_timeout,
            self.source
                .fetch_transactions(&record.domains, DEFAULT_PAGE, DEFAULT_PER_PAGE),
        );

        let result = tokio::select! {
            () = self.cancel_token.cancelled() => {
                debug!(target: "refresher", "Refresh cancelled by shutdown");
                counter!("refresh_total", "outcome" => "cancelled").increment(1);
                return RefreshOutcome::Cancelled;
            }
            result = fetch => result,
        };
        histogram!("refresh_fetch_duration_seconds").record(started_at.elapsed().as_secs_f64());

        let payload = match result {
            Ok(Ok(payload)) => payload,
            Ok(Err(err)) => return self.fail(token, failure_kind(&err), err.to_string()),
            Err(_elapsed) => {
                return self.fail(
                    token,
                    "timeout",
                    format!("Upstream request timed out after {:?}", self.request_timeout),
                );
            }
        };

        let hash = hash_payload(&payload);
        self.registry.update(token, hash.clone());
        counter!("refresh_total", "outcome" => "updated").increment(1);
        debug!(target: "refresher", payload_len = payload.len(), %hash, "Refreshed hash");

        RefreshOutcome::Updated(hash)
    }

    fn fail(&self, token: &str, kind: &'static str, reason: String) -> RefreshOutcome {
        warn!(target: "refresher", kind, error = %reason, "Refresh failed");
        counter!("refresh_total", "outcome" => kind).increment(1);
        self.registry.record_failure(token, reason.clone());
        RefreshOutcome::Failed(reason)
    }
}

/// Hex-encoded SHA-256 of a raw upstream payload.
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

fn failure_kind(err: &TxsClientError) -> &'static str {
    match err {
        TxsClientError::Transport(_) => "transport",
        TxsClientError::Upstream { .. } => "upstream",
        TxsClientError::Throttled => "throttled",
        TxsClientError::Encoding(_) => "encoding",
        TxsClientError::UrlParse(_) | TxsClientError::InvalidHeader(_) => "config",
    }
}
