//! Monica REST API client
//!
//! Issues authenticated GET requests and returns the JSON body. Retries are
//! left to the caller; only a request timeout is configured.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::journal::{FetchError, Fetcher};

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for a Monica instance authenticated with a bearer token
#[derive(Debug, Clone)]
pub struct MonicaClient {
    http_client: Client,
    api_key: String,
}

impl MonicaClient {
    /// Creates a client with the default timeout and user agent
    pub fn new(api_key: impl Into<String>) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .user_agent(concat!("journalsync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self::with_client(http_client, api_key))
    }

    /// Creates a client around an existing HTTP client
    pub fn with_client(http_client: Client, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
        }
    }
}

impl Fetcher for MonicaClient {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        let request_err = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(request_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(request_err)
    }
}
