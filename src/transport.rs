//! Provider transport: the only code that talks to the network.
//!
//! The fallback search is written against the [`ProviderTransport`] trait so
//! that status classification, ordering and validation can be exercised with
//! scripted transports in tests. [`HttpTransport`] is the production
//! implementation on top of `reqwest`.
//!
//! A transport reports *what happened on the wire*: a status code and a
//! body, or a transport-level failure. Deciding whether a status is
//! retryable belongs to [`crate::pipeline::executor`].

use crate::error::ExtractError;
use crate::pipeline::catalog::Candidate;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Page size requested from the model-listing endpoint.
pub const LIST_PAGE_SIZE: u32 = 1000;

/// One HTTP exchange that produced a status line.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body as text, lossily decoded, for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).trim().to_string()
    }
}

/// The request never produced a status line.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// The request URL carries the API key, so it is stripped before the
    /// error is formatted.
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        let e = e.without_url();
        if e.is_timeout() {
            TransportError::Timeout {
                secs: timeout.as_secs(),
            }
        } else if e.is_connect() {
            TransportError::Connect(describe(&e))
        } else {
            TransportError::Other(describe(&e))
        }
    }
}

/// `e` followed by its source chain, e.g.
/// `error sending request: client error (Connect): tcp connect error`.
fn describe(e: &(dyn std::error::Error + 'static)) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Abstraction over the provider's two endpoints.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Fetch one page of the model listing (`GET /v1beta/models`).
    async fn list_models(
        &self,
        page_token: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;

    /// Send a `generateContent` request to a single candidate.
    async fn generate(
        &self,
        candidate: &Candidate,
        body: Bytes,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport for the Generative Language API.
///
/// The credential travels as the `key` query parameter on both endpoints.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("filetext/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExtractError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn generate_url(&self, candidate: &Candidate) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url,
            candidate.api_version.as_str(),
            candidate.model
        )
    }

    async fn read(response: reqwest::Response, timeout: Duration) -> Result<RawResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl ProviderTransport for HttpTransport {
    async fn list_models(
        &self,
        page_token: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}/v1beta/models", self.base_url);
        let page_size = LIST_PAGE_SIZE.to_string();
        let mut query: Vec<(&str, &str)> = vec![("key", self.api_key.as_str()), ("pageSize", page_size.as_str())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        debug!("Listing models: {}", url);
        let response = self
            .client
            .get(&url)
            .query(&query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        Self::read(response, timeout).await
    }

    async fn generate(
        &self,
        candidate: &Candidate,
        body: Bytes,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let url = self.generate_url(candidate);
        debug!("POST {} ({} bytes, timeout {}s)", url, body.len(), timeout.as_secs());

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout))?;
        Self::read(response, timeout).await
    }
}
