//! HTTP transport for the search backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::backend::{BackendFailure, BackendRequest, RawResponse, SearchBackend};
use crate::config::BackendConfig;
use crate::error::{Result, SearchlineError};

/// Builder for [`HttpBackend`].
#[derive(Debug, Clone, Default)]
pub struct HttpBackendBuilder {
    base_url: Option<String>,
    connect_timeout: Option<Duration>,
}

impl HttpBackendBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpBackend> {
        let base_url = self
            .base_url
            .ok_or_else(|| SearchlineError::config("backend base_url is required"))?;
        let client = Client::builder()
            .connect_timeout(self.connect_timeout.unwrap_or(Duration::from_secs(5)))
            .build()
            .map_err(|e| SearchlineError::backend(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Talks to the backend's `_search` endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn builder() -> HttpBackendBuilder {
        HttpBackendBuilder::default()
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::builder()
            .base_url(&config.base_url)
            .connect_timeout(config.connect_timeout)
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn search(
        &self,
        request: &BackendRequest,
    ) -> std::result::Result<RawResponse, BackendFailure> {
        let url = format!("{}/{}", self.base_url, request.path());
        debug!(url = %url, "Sending search request");

        let response = self
            .client
            .post(&url)
            .query(&request.params)
            .timeout(request.client_timeout)
            .json(&request.body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendFailure::from_body(status.as_u16(), &body));
        }

        response.json::<RawResponse>().await.map_err(transport_failure)
    }
}

fn transport_failure(error: reqwest::Error) -> BackendFailure {
    if error.is_timeout() {
        BackendFailure::client_timeout(error.to_string())
    } else {
        BackendFailure::transport(error.to_string())
    }
}
