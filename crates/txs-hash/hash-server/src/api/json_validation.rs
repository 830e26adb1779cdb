use http_body_util::{
    BodyExt,
    LengthLimitError,
    Limited,
};
use hyper::body::{
    Body,
    Bytes,
};
use txs_hash_core::DomainList;

use crate::api::types::ApiError;

/// Maximum allowed JSON payload size (64KiB)
pub const MAX_JSON_SIZE: usize = 64 * 1024;

/// Collects a request body, refusing anything over [`MAX_JSON_SIZE`].
pub async fn read_body<B>(body: B) -> Result<Bytes, ApiError>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    match Limited::new(body, MAX_JSON_SIZE).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ApiError::PayloadTooLarge)
        }
        Err(err) => Err(ApiError::Body(err.to_string())),
    }
}

/// Parses a subscribe body. Emptiness of the list is checked by the registry.
pub fn parse_domain_list(body: &[u8]) -> Result<Vec<String>, ApiError> {
    serde_json::from_slice::<DomainList>(body)
        .map(|list| list.domains)
        .map_err(|err| ApiError::BadRequest(format!("Invalid domain list: {err}")))
}
