//! The REST layer.
//!
//! Requests flow through three pieces:
//!
//! - [`RestClient`]: builds `<api version>/<path>` request paths, encodes
//!   bodies and classifies responses into [`crate::Error`]s.
//! - [`RetryTransport`]: retries throttled and transient failures with
//!   capped exponential backoff. The client never sees the retries.
//! - [`HttpTransport`]: the actual HTTP call, with a bearer token from a
//!   [`crate::credentials::TokenCredential`].
//!
//! Any [`Transport`] can stand in for [`HttpTransport`], which is how the
//! tests run without a network.

mod client;
mod retry;
mod transport;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialError;

pub use client::{RestClient, RestResponse};
pub use retry::{RetryPolicy, RetryTransport};
pub use transport::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as the transport sees it. `path` already includes the API
/// version segment, and is relative to the service's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// The server's `Retry-After` hint, when it sent one in seconds.
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> HttpResponse {
        HttpResponse {
            status,
            body: body.into(),
            retry_after: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request cancelled")]
    Cancelled,
    #[error("could not obtain an access token: {0}")]
    Credential(#[from] CredentialError),
    #[error("{0}")]
    Failed(String),
}

/// Sends one request and returns whatever response arrived, successful or
/// not. Status codes are interpreted by the layers above.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError>;
}

/// Parse a `Retry-After` header value given in seconds.
///
/// The HTTP-date form is not supported and yields `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
