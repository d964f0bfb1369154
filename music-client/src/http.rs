//! Shared request plumbing: send, check status, decode.
//!
//! Error bodies are never read. A success body that does not decode is a
//! [`RawFailure::Malformed`].

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::error::RawFailure;

/// Build the shared client. Per-attempt deadlines are applied by the retry
/// engine, so no client-level timeout is set here.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("echona/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RawFailure> {
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(RawFailure::from_response(&response));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| RawFailure::Malformed(err.to_string()))
}

/// For endpoints that answer with an empty body (e.g. 204 on playback).
pub(crate) async fn send_empty(request: RequestBuilder) -> Result<(), RawFailure> {
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(RawFailure::from_response(&response));
    }
    Ok(())
}
