//! Function client — authenticated call to the named Azure Function.

use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::config::HttpTimeouts;
use crate::error::ErrorCode;

/// Errors produced by the function call.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request did not complete.
    #[error("request failed: {0}")]
    Request(String),

    /// The function answered with a non-success status.
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for RemoteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_REMOTE_REQUEST",
            Self::Status { .. } => "E_REMOTE_STATUS",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

/// Remote function seam. Enables mocking in tests.
#[async_trait::async_trait]
pub trait RemoteFunction: Send + Sync {
    async fn call(&self, access_token: &str) -> Result<Value, RemoteError>;
}

pub struct FunctionClient {
    http: reqwest::Client,
    url: String,
}

impl FunctionClient {
    /// Client for `GET <base_url>/<function_name>`.
    pub fn new(base_url: &str, function_name: &str, timeouts: HttpTimeouts) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| RemoteError::HttpClientBuild(e.to_string()))?;
        let url = format!("{}/{}", base_url.trim_end_matches('/'), function_name.trim_start_matches('/'));
        Ok(Self { http, url })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl RemoteFunction for FunctionClient {
    async fn call(&self, access_token: &str) -> Result<Value, RemoteError> {
        let request_id = Uuid::new_v4();
        tracing::info!(url = %self.url, %request_id, "calling function");

        let response = self
            .http
            .get(&self.url)
            .bearer_auth(access_token)
            .header("x-ms-client-request-id", request_id.to_string())
            .send()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::Status { status: status.as_u16(), body });
        }

        Ok(parse_body(&body))
    }
}

/// JSON bodies stay JSON; anything else becomes a JSON string; empty is `null`.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[cfg(test)]
#[path = "remote_test.rs"]
mod tests;
