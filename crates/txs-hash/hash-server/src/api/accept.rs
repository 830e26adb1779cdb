use crate::api::{
    process_request::match_route,
    types::ApiState,
};

use core::convert::Infallible;

use http_body_util::Full;
use hyper::{
    Method,
    Request,
    Response,
    StatusCode,
    body::{
        Body,
        Bytes,
    },
    header::{
        CONTENT_TYPE,
        HeaderValue,
    },
};

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Accepts an incoming HTTP request, which it responds with
/// the appropriate api call.
#[tracing::instrument(level = "info", skip_all, target = "api::accept_request")]
pub async fn accept_request<B>(
    req: Request<B>,
    state: ApiState,
    client_addr: std::net::SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if req.uri().path() == "/health" && req.method() == Method::GET {
        return Ok(text_response(StatusCode::OK, "ok"));
    }

    tracing::debug!(target = "api::accept_request", "Incoming request");
    let response = match match_route(req, &state, client_addr).await {
        Ok(body) => text_response(StatusCode::OK, body),
        Err(e) => text_response(e.status(), e.to_string()),
    };
    Ok(response)
}

/// Macros for accepting requests
#[macro_export]
macro_rules! accept {
    (
        $io:expr,
        $state:expr,
        $client_addr:expr
    ) => {
        let state = $state.clone();
        let client_addr = $client_addr;
        // Bind the incoming connection to our service
        if let Err(err) = hyper::server::conn::http1::Builder::new()
            // `service_fn` converts our function in a `Service`
            .serve_connection(
                $io,
                hyper::service::service_fn(move |req| {
                    let state = state.clone();
                    async move {
                        $crate::api::accept::accept_request(req, state, client_addr).await
                    }
                }),
            )
            .await
        {
            tracing::error!(?err, "Error serving connection");
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        queue::RefreshQueue,
        refresher::{
            HashRefresher,
            tests::ScriptedSource,
        },
        registry::SubscriptionRegistry,
    };
    use http_body_util::BodyExt;
    use std::{
        sync::Arc,
        time::Duration,
    };
    use tokio_util::sync::CancellationToken;

    fn test_state() -> ApiState {
        let registry = Arc::new(SubscriptionRegistry::new());
        let refresher = Arc::new(HashRefresher::new(
            registry.clone(),
            Arc::new(ScriptedSource::always(b"abc")),
            Duration::from_secs(1),
            CancellationToken::new(),
        ));
        let (queue, _rx) = RefreshQueue::new(8);
        ApiState {
            registry,
            refresher,
            queue,
        }
    }

    async fn send(method: Method, path: &str, body: &'static [u8]) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from_static(body)))
            .unwrap();
        let response = accept_request(req, test_state(), "127.0.0.1:1".parse().unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        assert_eq!(
            send(Method::GET, "/health", b"").await,
            (StatusCode::OK, "ok".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (status, _) = send(Method::GET, "/books/1", b"").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let (status, _) = send(Method::POST, "/ud/txs/hash/abc", b"").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_subscribe_is_bad_request() {
        let (status, body) = send(Method::POST, "/ud/txs/subscribe", b"{").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid domain list"));
    }
}
