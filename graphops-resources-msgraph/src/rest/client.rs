use std::sync::Arc;

use graphops_dynamic::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{HttpRequest, Method, Transport, TransportError};
use crate::{
    api_version::ApiVersion,
    error::{Error, OperationError, Result},
};

/// A successful response, still carrying enough of its request for error
/// reporting.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl RestResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as a [`Value`].
    pub fn json(&self) -> Result<Value> {
        graphops_dynamic::decode(&self.body).map_err(|source| Error::Decode {
            method: self.method,
            path: self.path.clone(),
            body: self.body_text(),
            source,
        })
    }

    /// Report that the body did not have the expected shape.
    pub fn unexpected(&self, message: impl Into<String>) -> Error {
        Error::ResponseShape {
            method: self.method,
            path: self.path.clone(),
            body: self.body_text(),
            message: message.into(),
        }
    }
}

/// Issues Graph requests against one default API version.
///
/// Cloning is cheap; clones share the transport.
#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn Transport>,
    api_version: ApiVersion,
    cancel: CancellationToken,
}

impl RestClient {
    pub fn new(transport: Arc<dyn Transport>, api_version: ApiVersion) -> RestClient {
        RestClient {
            transport,
            api_version,
            cancel: CancellationToken::new(),
        }
    }

    /// A client whose requests are abandoned when `cancel` fires.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> RestClient {
        RestClient {
            cancel,
            ..self.clone()
        }
    }

    /// The request path for `path`; a resource's own version beats the default.
    pub fn resolve_path(&self, path: &str, api_version: Option<ApiVersion>) -> String {
        let version = api_version.unwrap_or(self.api_version);
        format!("{}/{}", version, path.trim_matches('/'))
    }

    pub async fn get(&self, path: &str, api_version: Option<ApiVersion>) -> Result<RestResponse> {
        self.send(Method::Get, path, api_version, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        api_version: Option<ApiVersion>,
        body: &Value,
    ) -> Result<RestResponse> {
        self.send(Method::Post, path, api_version, Some(body)).await
    }

    pub async fn patch(
        &self,
        path: &str,
        api_version: Option<ApiVersion>,
        body: &Value,
    ) -> Result<RestResponse> {
        self.send(Method::Patch, path, api_version, Some(body)).await
    }

    /// Delete an object. An object that is already gone (404) counts as
    /// deleted.
    pub async fn delete(
        &self,
        path: &str,
        api_version: Option<ApiVersion>,
    ) -> Result<RestResponse> {
        self.send(Method::Delete, path, api_version, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        api_version: Option<ApiVersion>,
        body: Option<&Value>,
    ) -> Result<RestResponse> {
        let path = self.resolve_path(path, api_version);
        debug!(%method, %path, "sending request");

        let request = HttpRequest {
            method,
            path: path.clone(),
            body: body.map(Value::encode),
        };
        let response = match self.transport.send(&request, &self.cancel).await {
            Ok(response) => response,
            Err(TransportError::Cancelled) => return Err(Error::Cancelled { method, path }),
            Err(e) => {
                return Err(OperationError {
                    method,
                    path,
                    status: None,
                    body: String::new(),
                    message: e.to_string(),
                }
                .into())
            }
        };
        debug!(%method, %path, status = response.status, "received response");

        let status = response.status;
        let ok = (200..300).contains(&status) || (method == Method::Delete && status == 404);
        if !ok {
            return Err(OperationError {
                method,
                path,
                status: Some(status),
                body: String::from_utf8_lossy(&response.body).into_owned(),
                message: format!("unexpected status {}", status),
            }
            .into());
        }
        Ok(RestResponse {
            method,
            path,
            status,
            body: response.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{fake::ScriptedTransport, HttpResponse};

    fn client(fake: &ScriptedTransport) -> RestClient {
        RestClient::new(Arc::new(fake.clone()), ApiVersion::V1_0)
    }

    #[tokio::test]
    async fn builds_versioned_paths() {
        let fake = ScriptedTransport::new([
            Ok(HttpResponse::new(200, "{}")),
            Ok(HttpResponse::new(200, "{}")),
        ]);
        let client = client(&fake);
        client.get("groups/X1", None).await.unwrap();
        client.get("/groups/X1", Some(ApiVersion::Beta)).await.unwrap();

        let paths: Vec<_> = fake.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, ["v1.0/groups/X1", "beta/groups/X1"]);
    }

    #[tokio::test]
    async fn encodes_body() {
        let fake = ScriptedTransport::new([Ok(HttpResponse::new(201, r#"{"id":"X1"}"#))]);
        let body = graphops_dynamic::decode(br#"{"displayName":"g"}"#).unwrap();
        let response = client(&fake).post("groups", None, &body).await.unwrap();
        assert_eq!(response.status, 201);

        let requests = fake.requests();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].body.as_deref(), Some(&br#"{"displayName":"g"}"#[..]));
    }

    #[tokio::test]
    async fn delete_treats_not_found_as_success() {
        let fake = ScriptedTransport::new([Ok(HttpResponse::new(404, "gone"))]);
        let response = client(&fake).delete("groups/X1", None).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn get_not_found_is_an_error() {
        let fake = ScriptedTransport::new([Ok(HttpResponse::new(404, "missing"))]);
        let err = client(&fake).get("groups/X1", None).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn delete_forbidden_is_an_error() {
        let fake = ScriptedTransport::new([Ok(HttpResponse::new(403, "denied"))]);
        let err = client(&fake).delete("groups/X1", None).await.unwrap_err();
        match err {
            Error::Operation(e) => {
                assert_eq!(e.status, Some(403));
                assert_eq!(e.method, Method::Delete);
                assert_eq!(e.path, "v1.0/groups/X1");
                assert_eq!(e.body, "denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_becomes_operation_error() {
        let fake = ScriptedTransport::new([Err("connection refused".to_string())]);
        let err = client(&fake).get("me", None).await.unwrap_err();
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let fake = ScriptedTransport::new([Ok(HttpResponse::new(200, "<html>"))]);
        let response = client(&fake).get("me", None).await.unwrap();
        let err = response.json().unwrap_err();
        assert!(matches!(err, Error::Decode { ref body, .. } if body == "<html>"));
    }
}
