use anyhow::Result;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::TcpListener,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use ud_txs_client::TransactionsSource;

use crate::{
    api::types::ApiState,
    queue::RefreshQueue,
    refresher::HashRefresher,
    registry::SubscriptionRegistry,
};

pub struct TxsHashServer {
    pub listener: TcpListener,
    pub registry: Arc<SubscriptionRegistry>,
    pub source: Arc<dyn TransactionsSource>,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    pub refresh_workers: usize,
    pub refresh_queue_capacity: usize,
}

// Type alias for boxed future
pub type BoxedFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

impl TxsHashServer {
    /// Start the server
    /// Returns the API, refresh worker and sweep futures, in that order.
    pub fn start(self, cancel_token: CancellationToken) -> (BoxedFuture, BoxedFuture, BoxedFuture) {
        let refresher = Arc::new(HashRefresher::new(
            self.registry.clone(),
            self.source,
            self.request_timeout,
            cancel_token.clone(),
        ));
        let (queue, queue_rx) = RefreshQueue::new(self.refresh_queue_capacity);

        let workers_handle = crate::queue::listen_for_refreshes(
            queue_rx,
            refresher.clone(),
            self.refresh_workers,
            cancel_token.clone(),
        );
        tracing::debug!(workers = self.refresh_workers, "Started refresh workers");

        let sweep_handle = crate::sweep::run_sweep(
            self.registry.clone(),
            queue.clone(),
            self.refresh_interval,
            cancel_token.clone(),
        );
        tracing::debug!(interval = ?self.refresh_interval, "Started refresh sweep");

        let state = ApiState {
            registry: self.registry,
            refresher,
            queue,
        };
        let api_handle = crate::api::serve(self.listener, state, cancel_token);

        tracing::info!("Started API server");

        (
            Box::pin(api_handle),
            Box::pin(workers_handle),
            Box::pin(sweep_handle),
        )
    }

    /// Run the server until the cancellation token is cancelled.
    /// If any component stops on its own the others are cancelled too.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<()> {
        let (api_handle, workers_handle, sweep_handle) = self.start(cancel_token.clone());

        let mut tasks = JoinSet::new();
        tasks.spawn(async move { ("Api", api_handle.await) });
        tasks.spawn(async move { ("Refresh workers", workers_handle.await) });
        tasks.spawn(async move { ("Sweep", sweep_handle.await) });

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                (name, Ok(())) => tracing::info!("{name} stopped."),
                (name, Err(e)) => {
                    metrics::counter!("server_component_errors_count").increment(1);
                    tracing::error!("{name} encountered an error, shutting down: {:?}", e);
                    first_error.get_or_insert(e);
                }
            }
            cancel_token.cancel();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
