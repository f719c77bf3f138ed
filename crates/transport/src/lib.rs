//! HTTP transport to ledger replicas.
//!
//! This crate moves opaque payloads to a replica and hands back the status
//! code and the body bytes untouched. It does not interpret successful
//! bodies: authentication must run over the exact bytes received, so
//! decoding is left to the caller.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use reqwest::Url;

/// Server-side commit timeout hint, in milliseconds.
pub const TX_TIMEOUT_HEADER: &str = "TxTimeout";
/// Identity of the querying user.
pub const USER_ID_HEADER: &str = "UserID";
/// Base64 signature of the querying user over the query payload.
pub const SIGNATURE_HEADER: &str = "Signature";

/// Status code of a completed request.
pub const STATUS_OK: u16 = 200;
/// Status code of a request the server accepted without a final outcome.
pub const STATUS_ACCEPTED: u16 = 202;

/// Errors that can occur while talking to a replica.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// True when the request certainly never reached the server.
    pub fn never_sent(&self) -> bool {
        match self {
            TransportError::InvalidUrl(_) => true,
            TransportError::Http(e) => e.is_connect() || e.is_builder(),
        }
    }
}

/// Status and body of a replica's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    async fn read(response: reqwest::Response) -> Result<Self, TransportError> {
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(Self { status, body })
    }
}

/// Query credentials attached to every ledger query.
#[derive(Debug, Clone)]
pub struct SignedQuery {
    pub user_id: String,
    pub signature: Vec<u8>,
}

/// Structured error a replica returns with a non-success status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(alias = "Error")]
    pub error: String,
}

/// Message to surface for a rejected request.
pub fn rejection_message(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => "(failed to parse the server's error message)".to_string(),
    }
}

/// Request/response exchange with a replica.
///
/// Deadlines are enforced by the caller around the returned future.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a transaction envelope encoded as `content_type`.
    /// `server_timeout` asks the server to wait that long for the
    /// transaction to commit before answering.
    async fn submit(
        &self,
        url: &Url,
        body: Vec<u8>,
        content_type: &'static str,
        server_timeout: Option<Duration>,
    ) -> Result<RawResponse, TransportError>;

    async fn query(&self, url: &Url, query: &SignedQuery) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (TLS roots, proxies, pool settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(
        &self,
        url: &Url,
        body: Vec<u8>,
        content_type: &'static str,
        server_timeout: Option<Duration>,
    ) -> Result<RawResponse, TransportError> {
        debug!("Submitting {} bytes of {} to {}", body.len(), content_type, url);

        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(timeout) = server_timeout {
            request = request.header(TX_TIMEOUT_HEADER, timeout.as_millis().to_string());
        }

        let response = request.send().await?;
        RawResponse::read(response).await
    }

    async fn query(&self, url: &Url, query: &SignedQuery) -> Result<RawResponse, TransportError> {
        debug!("Querying {} as {}", url, query.user_id);

        let response = self
            .client
            .get(url.clone())
            .header(USER_ID_HEADER, &query.user_id)
            .header(SIGNATURE_HEADER, BASE64.encode(&query.signature))
            .send()
            .await?;
        RawResponse::read(response).await
    }
}
