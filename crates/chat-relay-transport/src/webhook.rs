//! Webhook backend over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chat_relay_core::{Backend, BackendError, WebhookRequest};
use serde_json::Value;

/// Default upper bound on a backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Webhook endpoint configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint receiving `new_message` posts.
    pub url: String,
    /// Upper bound on a single call, connect through body.
    pub timeout: Duration,
}

impl WebhookConfig {
    /// Configuration with the default timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Backend that posts JSON to a webhook with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpBackend {
    /// Build a backend from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(config: WebhookConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url,
        })
    }

    /// Endpoint this backend posts to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn transport_error(e: &reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn post(&self, request: &WebhookRequest) -> Result<Value, BackendError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(|e| transport_error(&e))?;
        serde_json::from_slice(&body).map_err(|e| BackendError::InvalidBody(e.to_string()))
    }
}
