//! Auth collaborator client.

use async_trait::async_trait;

use crate::error::AuthError;
use crate::observability::context;

/// Source of the opaque user payload returned with every todo list.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn authenticate(&self) -> Result<serde_json::Value, AuthError>;
}

/// Calls the auth service over HTTP.
///
/// The ambient trace context is forwarded as `traceparent` and `baggage`
/// headers. No timeout and no retries.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    client: reqwest::Client,
    url: String,
}

impl HttpAuthClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn authenticate(&self) -> Result<serde_json::Value, AuthError> {
        let mut request = self.client.get(&self.url);
        if let Some(ctx) = context::current() {
            for (name, value) in ctx.outbound_headers() {
                request = request.header(name, value);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = %status, "Auth service rejected request");
            return Err(AuthError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}
