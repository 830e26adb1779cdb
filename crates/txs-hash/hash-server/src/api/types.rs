use std::sync::Arc;

use hyper::{
    Method,
    StatusCode,
};

use crate::{
    queue::RefreshQueue,
    refresher::HashRefresher,
    registry::{
        RegistryError,
        SubscriptionRegistry,
    },
};

/// Shared handles every request handler works against.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SubscriptionRegistry>,
    pub refresher: Arc<HashRefresher>,
    pub queue: RefreshQueue,
}

/// Failures surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Subscription not found")]
    NotFound,
    #[error("Route not found")]
    RouteNotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Failed to read request body: {0}")]
    Body(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidSubscription => Self::BadRequest(err.to_string()),
            RegistryError::NotFound(_) => Self::NotFound,
        }
    }
}

/// Routes served under `/ud/txs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Subscribe,
    Unsubscribe(&'a str),
    Hash(&'a str),
}

impl<'a> Route<'a> {
    pub fn parse(method: &Method, path: &'a str) -> Result<Self, ApiError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let (route, expected) = match segments.as_slice() {
            ["ud", "txs", "subscribe"] => (Route::Subscribe, Method::POST),
            ["ud", "txs", "unsubscribe", token] => (Route::Unsubscribe(*token), Method::GET),
            ["ud", "txs", "hash", token] => (Route::Hash(*token), Method::GET),
            _ => return Err(ApiError::RouteNotFound),
        };

        if *method != expected {
            return Err(ApiError::MethodNotAllowed);
        }
        Ok(route)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::Subscribe => "subscribe",
            Route::Unsubscribe(_) => "unsubscribe",
            Route::Hash(_) => "hash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parse() {
        assert_eq!(
            Route::parse(&Method::POST, "/ud/txs/subscribe").unwrap(),
            Route::Subscribe
        );
        assert_eq!(
            Route::parse(&Method::GET, "/ud/txs/unsubscribe/abc").unwrap(),
            Route::Unsubscribe("abc")
        );
        assert_eq!(
            Route::parse(&Method::GET, "/ud/txs/hash/abc/").unwrap(),
            Route::Hash("abc")
        );
    }

    #[test]
    fn test_route_parse_errors() {
        assert!(matches!(
            Route::parse(&Method::GET, "/ud/txs/subscribe"),
            Err(ApiError::MethodNotAllowed)
        ));
        assert!(matches!(
            Route::parse(&Method::GET, "/ud/txs/hash"),
            Err(ApiError::RouteNotFound)
        ));
        assert!(matches!(
            Route::parse(&Method::GET, "/books"),
            Err(ApiError::RouteNotFound)
        ));
    }

    #[test]
    fn test_registry_errors_map_to_status() {
        assert_eq!(
            ApiError::from(RegistryError::InvalidSubscription).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(RegistryError::NotFound("t".to_string())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
