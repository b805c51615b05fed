use agentforge_common::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::request::PreparedRequest;

/// Status and raw body of an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Sends prepared requests to an upstream provider.
///
/// Any response that arrives, whatever its status, is `Ok`. Only failures
/// to obtain a response map to [`Error::Transport`].
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse>;
}

/// reqwest-backed transport. The per-request timeout comes from the
/// prepared request.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    #[instrument(skip_all, fields(route = ?request.route, endpoint = %request.endpoint))]
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse> {
        let mut builder = self
            .client
            .post(&request.endpoint)
            .timeout(request.timeout)
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        debug!("upstream responded with status {}", status);
        Ok(RawResponse { status, body })
    }
}
