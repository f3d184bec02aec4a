use std::{collections::BTreeMap, future::Future, pin::Pin};

use http::Method;

use crate::modules::error::PushlineResult;

/// A fully formed request, ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }
}

pub type TransportFuture = Pin<Box<dyn Future<Output = PushlineResult<HttpResponse>> + Send>>;

/// Sends requests for the runner. Errors are reserved for failures where no
/// HTTP response was received (unreachable host, timeout).
pub trait NetworkTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> TransportFuture;
}
