use std::{
    net::SocketAddr,
    time::Instant,
};

use hyper::{
    Request,
    body::Body,
};
use metrics::{
    counter,
    gauge,
    histogram,
};
use tracing::{
    debug,
    info,
    warn,
};
use uuid::Uuid;

use crate::api::{
    json_validation::{
        parse_domain_list,
        read_body,
    },
    types::{
        ApiError,
        ApiState,
        Route,
    },
};

/// Matches the incoming request to a subscription route and runs it.
#[tracing::instrument(
    level = "debug",
    skip_all,
    target = "api::match_route",
    fields(request_id, client_addr)
)]
pub async fn match_route<B>(
    req: Request<B>,
    state: &ApiState,
    client_addr: SocketAddr,
) -> Result<String, ApiError>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let request_id = Uuid::new_v4();
    let client_ip = client_addr.ip().to_string();

    tracing::Span::current().record("request_id", tracing::field::display(&request_id));
    tracing::Span::current().record("client_addr", tracing::field::display(&client_addr));

    let (parts, body) = req.into_parts();
    let route = match Route::parse(&parts.method, parts.uri.path()) {
        Ok(route) => route,
        Err(err) => {
            debug!(target: "api", %request_id, %client_ip, method = %parts.method, path = parts.uri.path(), "Unroutable request");
            return Err(err);
        }
    };

    let labels = [("route", route.name())];
    gauge!("api_requests_active", &labels).increment(1);
    counter!("api_requests_count", &labels).increment(1);
    info!(target: "api", route = route.name(), %request_id, %client_ip, "Received request");

    let req_start = Instant::now();
    let result = match route {
        Route::Subscribe => {
            match read_body(body).await {
                Ok(bytes) => process_subscribe(&bytes, state),
                Err(err) => Err(err),
            }
        }
        Route::Unsubscribe(token) => {
            state.registry.remove(token);
            debug!(target: "api", %request_id, token, "Removed subscription");
            Ok("OK".to_string())
        }
        Route::Hash(token) => process_get_hash(token, state).await,
    };

    histogram!("api_request_duration_seconds", &labels).record(req_start.elapsed().as_secs_f64());
    gauge!("api_requests_active", &labels).decrement(1);

    match &result {
        Ok(_) => {
            info!(target: "api", route = route.name(), %request_id, %client_ip, duration_ms = req_start.elapsed().as_millis(), "Request completed successfully");
        }
        Err(err) => {
            counter!("api_requests_error_count", &labels).increment(1);
            warn!(target: "api", route = route.name(), %request_id, %client_ip, error = %err, duration_ms = req_start.elapsed().as_millis(), "Request failed");
        }
    }

    result
}

fn process_subscribe(body: &[u8], state: &ApiState) -> Result<String, ApiError> {
    let domains = parse_domain_list(body)?;
    let domain_count = domains.len();
    let token = state.registry.add_new(domains)?;

    info!(target: "api", %token, domain_count, "Created subscription");

    // The first hash is computed in the background; lookups trigger their own refresh.
    state.queue.submit(token.clone());
    Ok(token)
}

async fn process_get_hash(token: &str, state: &ApiState) -> Result<String, ApiError> {
    state.refresher.refresh(token).await;
    let record = state.registry.find(token)?;
    Ok(record.hash.unwrap_or_default())
}
