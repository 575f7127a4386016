//! Remote source of API responses

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when requesting API data
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be built
    #[error("HTTP client could not be created: {0}")]
    Client(#[source] reqwest::Error),

    /// HTTP request failed or the body was not JSON
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Retrieves the JSON document behind a URL
///
/// Implementations own any retry or authentication policy; callers await
/// one request at a time.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError>;
}
