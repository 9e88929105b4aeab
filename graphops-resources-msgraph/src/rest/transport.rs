use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use tokio_util::sync::CancellationToken;

use super::{parse_retry_after, HttpRequest, HttpResponse, Method, Transport, TransportError};
use crate::credentials::TokenCredential;

/// Sends requests to the Graph service over HTTPS.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
}

impl HttpTransport {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        credential: Arc<dyn TokenCredential>,
        scopes: Vec<String>,
    ) -> HttpTransport {
        HttpTransport {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
            scopes,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let token = self.credential.get_token(&self.scopes).await?;

        let mut builder = self
            .http
            .request(request.method.into(), self.url(&request.path))
            .bearer_auth(token.secret())
            .header(ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await.map_err(failed)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.bytes().await.map_err(failed)?.to_vec();

        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn failed(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Failed(format!("request timed out: {}", e))
    } else {
        TransportError::Failed(e.to_string())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.send_once(request) => result,
        }
    }
}
