//! # `api`
//!
//! The `api` mod serves the transaction hash subscription endpoints.
//!
//! ## Routes
//!
//! ### `POST /ud/txs/subscribe`
//!
//! Registers a list of domains and returns the subscription token as plain
//! text. The first hash is computed in the background.
//!
//! ```json
//! { "domains": ["alice.crypto", "bob.x"] }
//! ```
//!
//! An empty or malformed domain list is rejected with `400`.
//!
//! ### `GET /ud/txs/unsubscribe/{token}`
//!
//! Removes the subscription and returns `OK`. Unknown tokens also return `OK`.
//!
//! ### `GET /ud/txs/hash/{token}`
//!
//! Refreshes the subscription, then returns the hex-encoded SHA-256 of the
//! last upstream payload, or an empty string if no refresh has succeeded yet.
//! Unknown tokens return `404`.
//!
//! ### `GET /health`
//!
//! Returns `ok`.
//!
//! ## Status Codes
//!
//! - 400: Malformed body or empty domain list
//! - 404: Unknown token or route
//! - 405: Known route, wrong method
//! - 413: Body larger than [`json_validation::MAX_JSON_SIZE`]

pub mod accept;
pub mod json_validation;
pub mod process_request;
pub mod types;

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use crate::api::types::ApiState;

use hyper_util::rt::TokioIo;
use tokio::net::{
    TcpListener,
    TcpStream,
};

use anyhow::Result;

/// Start the API server
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    cancel_token: CancellationToken,
) -> Result<()> {
    // We start a loop to continuously accept incoming connections
    loop {
        tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("Api received cancellation signal, shutting down...");
                    break;
                }
                res = listener.accept() => {
                    match res {
                        Ok((stream, socketaddr)) => {
                            serve_connection(socketaddr, &state, stream);
                        }
                        Err(err) => {
                            tracing::error!(?err, "Error accepting connection");
                        }
                    }
                }
        }
    }

    Ok(())
}

fn serve_connection(socketaddr: SocketAddr, state: &ApiState, stream: TcpStream) {
    tracing::debug!("Connection from: {}", socketaddr);

    // Use an adapter to access something implementing `tokio::io` traits as if they implement
    // `hyper::rt` IO traits.
    let io = TokioIo::new(stream);

    let state = state.clone();

    // Spawn a tokio task to serve multiple connections concurrently
    tokio::task::spawn(async move {
        crate::accept!(io, state, socketaddr);
    });
}
