use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    StatusCode,
    header::{
        self,
        HeaderMap,
        HeaderValue,
    },
};
use url::Url;

pub use txs_hash_core::{
    TxsRequest,
    UpstreamErrorResponse,
};

/// Production host of the transactions API.
pub const PRODUCTION_URL: &str = "https://unstoppabledomains.com";

/// Staging host of the transactions API.
pub const STAGING_URL: &str = "https://mobile-staging.api.ud-staging.com";

/// Path of the "transactions by domain list" endpoint.
pub const TXS_PATH: &str = "/api/v1/resellers/mobile-app-v1/txs";

/// Header carrying the client version on every upstream request.
pub const APP_VERSION_HEADER: &str = "X-IOS-APP-VERSION";

/// Client version sent when none is configured.
pub const DEFAULT_CLIENT_VERSION: &str = "4.3.0";

#[derive(Debug, thiserror::Error)]
pub enum TxsClientError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Upstream error {status_code}: {message}")]
    Upstream { status_code: u16, message: String },
    #[error("Upstream is throttling requests")]
    Throttled,
    #[error("Failed to encode transactions request: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

/// Source of raw transaction payloads for a list of domains.
#[async_trait]
pub trait TransactionsSource: Send + Sync {
    async fn fetch_transactions(
        &self,
        domains: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<u8>, TxsClientError>;
}

/// Base URL of the transactions API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxsEndpoint {
    base_url: Url,
}

impl TxsEndpoint {
    pub fn new(base_url: &str) -> Result<Self, TxsClientError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
        })
    }

    /// Picks the staging or the production host.
    pub fn for_environment(use_staging: bool) -> Result<Self, TxsClientError> {
        if use_staging {
            Self::new(STAGING_URL)
        } else {
            Self::new(PRODUCTION_URL)
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full URL of one page of the transactions endpoint.
    pub fn transactions_url(&self, page: u32, per_page: u32) -> Result<Url, TxsClientError> {
        let mut url = self.base_url.join(TXS_PATH)?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("perPage", &per_page.to_string());
        Ok(url)
    }
}

/// A client for the upstream transactions API
///
/// ``` no_run
/// use std::time::Duration;
/// use ud_txs_client::{TransactionsClient, TxsEndpoint, DEFAULT_CLIENT_VERSION};
///
/// #[tokio::main]
/// async fn main() {
///     let endpoint = TxsEndpoint::for_environment(false).unwrap();
///     let client = TransactionsClient::new(endpoint, DEFAULT_CLIENT_VERSION, Duration::from_secs(30)).unwrap();
///     let bytes = client.fetch_transactions(&["alice.crypto".to_string()], 1, 1000).await.unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TransactionsClient {
    client: Client,
    endpoint: TxsEndpoint,
}

impl TransactionsClient {
    /// Create a new client sending the fixed JSON headers and `client_version`.
    pub fn new(
        endpoint: TxsEndpoint,
        client_version: &str,
        request_timeout: Duration,
    ) -> Result<Self, TxsClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            APP_VERSION_HEADER,
            client_version
                .parse()
                .map_err(|_| TxsClientError::InvalidHeader(client_version.to_string()))?,
        );

        let client = Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &TxsEndpoint {
        &self.endpoint
    }

    /// Fetch one page of transactions for `domains` as raw response bytes.
    pub async fn fetch_transactions(
        &self,
        domains: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<u8>, TxsClientError> {
        let url = self.endpoint.transactions_url(page, per_page)?;
        let body = serde_json::to_vec(&TxsRequest::for_domains(domains))?;

        tracing::debug!(%url, domains = domains.len(), "Requesting transactions");

        let response = self.client.post(url).body(body).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Request failed due to upstream throttling");
            return Err(TxsClientError::Throttled);
        }

        if !status.is_success() {
            let data = response.bytes().await.unwrap_or_default();
            return Err(TxsClientError::Upstream {
                status_code: status.as_u16(),
                message: extract_error_message(&data),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl TransactionsSource for TransactionsClient {
    async fn fetch_transactions(
        &self,
        domains: &[String],
        page: u32,
        per_page: u32,
    ) -> Result<Vec<u8>, TxsClientError> {
        TransactionsClient::fetch_transactions(self, domains, page, per_page).await
    }
}

/// Empty when the payload is not an upstream error response.
fn extract_error_message(data: &[u8]) -> String {
    serde_json::from_slice::<UpstreamErrorResponse>(data)
        .map(|response| response.joined_message())
        .unwrap_or_default()
}
