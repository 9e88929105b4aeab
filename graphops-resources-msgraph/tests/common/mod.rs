#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use graphops_dynamic::Value;
use graphops_resources_msgraph::{
    rest::{HttpRequest, HttpResponse, Method, RestClient, Transport, TransportError},
    ApiVersion,
};
use tokio_util::sync::CancellationToken;

/// A Graph backend that answers from a script and records what it was asked.
#[derive(Clone, Default)]
pub struct FakeGraph {
    script: Arc<Mutex<VecDeque<(Method, String, HttpResponse)>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a request and answer it with `status` and `body`.
    pub fn expect(self, method: Method, path: &str, status: u16, body: &str) -> Self {
        self.script.lock().unwrap().push_back((
            method,
            path.to_string(),
            HttpResponse::new(status, body),
        ));
        self
    }

    pub fn client(&self) -> RestClient {
        RestClient::new(Arc::new(self.clone()), ApiVersion::V1_0)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The decoded body of request number `i`.
    pub fn body(&self, i: usize) -> Value {
        let body = self.requests()[i].body.clone().expect("request has a body");
        graphops_dynamic::decode(&body).unwrap()
    }

    pub fn assert_done(&self) {
        let remaining = self.script.lock().unwrap();
        assert!(remaining.is_empty(), "unused responses: {:?}", remaining);
    }
}

#[async_trait]
impl Transport for FakeGraph {
    async fn send(
        &self,
        request: &HttpRequest,
        _cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let (method, path, response) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request {} {}", request.method, request.path));
        assert_eq!(
            (request.method, request.path.as_str()),
            (method, path.as_str()),
            "request out of order"
        );
        Ok(response)
    }
}

pub fn value(json: &str) -> Value {
    graphops_dynamic::decode(json.as_bytes()).unwrap()
}
