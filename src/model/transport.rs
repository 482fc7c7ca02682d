use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use super::types::GenerateRequest;

/// What went wrong on one transport path, classified by the HTTP layer so
/// callers never have to inspect message text.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Upstream is alive but shedding load; retrying later may succeed.
    #[error("model endpoint overloaded: {0}")]
    Overloaded(String),

    /// This path is not serving the API at all: network failure, an HTML
    /// body from some other handler, or a missing route.
    #[error("model endpoint unavailable: {0}")]
    Unavailable(String),

    /// The request itself was refused; retrying will not help.
    #[error("model request rejected: {0}")]
    Rejected(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Overloaded(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

/// One generateContent call. Implementations return the raw response body;
/// normalization happens in the caller.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn generate(&self, request: &GenerateRequest)
    -> Result<String, TransportError>;

    fn name(&self) -> &'static str;
}

/// Server-side proxy path. Keeps the model credential off this process's
/// callers; the proxy passes the upstream status and body through.
pub struct ProxyTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl ProxyTransport {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ModelTransport for ProxyTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, TransportError> {
        debug!(endpoint = %self.endpoint, "calling proxy transport");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        classify(status, body)
    }

    fn name(&self) -> &'static str {
        "proxy"
    }
}

/// Direct path to the hosted model API using a locally held credential.
pub struct DirectTransport {
    client: reqwest::Client,
    url: String,
}

impl DirectTransport {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str, api_key: &str) -> Self {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            base_url.trim_end_matches('/'),
            model,
            api_key
        );
        Self { client, url }
    }
}

#[async_trait]
impl ModelTransport for DirectTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, TransportError> {
        debug!("calling direct transport");
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        classify(status, body)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Maps an HTTP response to a body or a classified failure. The transient
/// set is exactly the overload-equivalent statuses: 429, 503, and other
/// generic 5xx answers.
fn classify(status: StatusCode, body: String) -> Result<String, TransportError> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(TransportError::Overloaded(format!("status {status}")));
    }
    if status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED {
        return Err(TransportError::Unavailable(format!("status {status}")));
    }
    if !status.is_success() {
        let detail: String = body.chars().take(200).collect();
        return Err(TransportError::Rejected(format!("status {status}: {detail}")));
    }

    // A success status with a non-JSON body means some other handler answered
    // on this route (the dev server's HTML 200, for instance).
    if serde_json::from_str::<serde_json::Value>(&body).is_err() {
        return Err(TransportError::Unavailable(
            "response body is not JSON".to_string(),
        ));
    }

    Ok(body)
}
