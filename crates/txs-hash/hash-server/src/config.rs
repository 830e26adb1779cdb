use std::{
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use ud_txs_client::{
    DEFAULT_CLIENT_VERSION,
    TransactionsClient,
    TxsEndpoint,
};

use crate::{
    registry::SubscriptionRegistry,
    server::TxsHashServer,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Api server address
    #[arg(long, env = "TXS_HASH_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,
    /// Use the staging transactions API instead of production
    #[arg(long, env = "TXS_HASH_USE_STAGING")]
    pub use_staging: bool,
    /// Base URL of the transactions API, overrides `--use-staging`
    #[arg(long, env = "TXS_HASH_UPSTREAM_URL")]
    pub upstream_url: Option<String>,
    /// Version sent in the client version header
    #[arg(long, env = "TXS_HASH_CLIENT_VERSION", default_value = DEFAULT_CLIENT_VERSION)]
    pub client_version: String,
    /// Timeout of a single upstream request, in seconds
    #[arg(long, env = "TXS_HASH_REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,
    /// Interval between refreshes of every subscription, in seconds
    #[arg(long, env = "TXS_HASH_REFRESH_INTERVAL_SECS", default_value = "60")]
    pub refresh_interval_secs: u64,
    /// Number of concurrent refresh workers
    #[arg(long, env = "TXS_HASH_REFRESH_WORKERS", default_value = "3")]
    pub refresh_workers: usize,
    /// Pending refreshes kept before new ones are dropped
    #[arg(long, env = "TXS_HASH_REFRESH_QUEUE_CAPACITY", default_value = "1024")]
    pub refresh_queue_capacity: usize,
    /// Log level
    #[arg(long, env = "TXS_HASH_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn endpoint(&self) -> anyhow::Result<TxsEndpoint> {
        let endpoint = match &self.upstream_url {
            Some(url) => TxsEndpoint::new(url)?,
            None => TxsEndpoint::for_environment(self.use_staging)?,
        };
        Ok(endpoint)
    }

    /// Build the transaction hash server
    pub async fn build(self) -> anyhow::Result<TxsHashServer> {
        // Bind to an address
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!(listen_addr = ?self.listen_addr, "Listening on address");

        let endpoint = self.endpoint()?;
        let request_timeout = Duration::from_secs(self.request_timeout_secs);
        let client = TransactionsClient::new(endpoint, &self.client_version, request_timeout)?;
        tracing::info!(
            upstream_url = %client.endpoint().base_url(),
            client_version = %self.client_version,
            "Configured transactions API"
        );

        let server = TxsHashServer {
            listener,
            registry: Arc::new(SubscriptionRegistry::new()),
            source: Arc::new(client),
            request_timeout,
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            refresh_workers: self.refresh_workers,
            refresh_queue_capacity: self.refresh_queue_capacity,
        };

        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use tokio_util::sync::CancellationToken;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::method,
    };

    fn test_config(upstream_url: String) -> Config {
        Config {
            listen_addr: SocketAddr::from_str("127.0.0.1:0").unwrap(),
            use_staging: false,
            upstream_url: Some(upstream_url),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            request_timeout_secs: 5,
            refresh_interval_secs: 60,
            refresh_workers: 2,
            refresh_queue_capacity: 16,
            log_level: LevelFilter::current(),
        }
    }

    #[tokio::test]
    async fn test_server_random_port() -> anyhow::Result<()> {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&upstream)
            .await;

        let server = test_config(upstream.uri()).build().await?;

        let listen_addr = server.listener.local_addr()?;
        // Check that we got a random port
        assert_ne!(listen_addr.port(), 0);
        let registry = server.registry.clone();

        let cancel_token = CancellationToken::new();
        let cancel_token_clone = cancel_token.clone();
        let task_handle = tokio::task::spawn(async move {
            server.run(cancel_token_clone).await.unwrap();
        });

        let token = reqwest::Client::new()
            .post(format!("http://{listen_addr}/ud/txs/subscribe"))
            .json(&serde_json::json!({ "domains": ["alice.crypto"] }))
            .send()
            .await?
            .text()
            .await?;

        // The subscribe-time refresh runs on a worker.
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.find(&token).unwrap().hash.is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;

        assert_eq!(
            registry.find(&token).unwrap().hash.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );

        cancel_token.cancel();
        task_handle.await.unwrap();
        Ok(())
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(vec!["program"]).unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(!config.use_staging);
        assert!(config.upstream_url.is_none());
        assert_eq!(config.client_version, "4.3.0");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.refresh_interval_secs, 60);
        assert_eq!(config.refresh_workers, 3);
        assert_eq!(config.refresh_queue_capacity, 1024);
        assert_eq!(config.log_level, LevelFilter::INFO);
    }

    #[test]
    fn test_config_args() {
        let config = Config::try_parse_from(vec![
            "program",
            "--listen-addr",
            "127.0.0.1:9000",
            "--use-staging",
            "--refresh-workers",
            "8",
            "--request-timeout-secs",
            "10",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert!(config.use_staging);
        assert_eq!(config.refresh_workers, 8);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.log_level, LevelFilter::DEBUG);
        assert_eq!(
            config.endpoint().unwrap(),
            TxsEndpoint::for_environment(true).unwrap()
        );
    }

    #[test]
    fn test_upstream_url_overrides_environment() {
        let config = Config::try_parse_from(vec![
            "program",
            "--use-staging",
            "--upstream-url",
            "http://127.0.0.1:3000",
        ])
        .unwrap();

        assert_eq!(
            config.endpoint().unwrap().base_url().as_str(),
            "http://127.0.0.1:3000/"
        );
    }
}
