//! This module contains `Transport`, the seam between the request pipeline
//! and the wire.
use self::inner::{BoxedTransport, TransportInner};
use crate::error::Result;

use bytes::Bytes;
use futures::future::Future;
use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

mod http;
pub use http::ReqwestTransport;

mod inner;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`, used for downloads.
    Get,
    /// `POST`, used for every API call and upload.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// A fully resolved request, ready to be written to the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name and value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Bytes,
}

impl HttpRequest {
    /// Returns the value of the first header matching `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl Debug for HttpRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let headers: Vec<_> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") {
                    (k.as_str(), "<redacted>")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();

        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// A response as read from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header name and value pairs.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a new response.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// A `200 OK` response with a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        let body = Bytes::from(value.to_string());
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        Self::new(200, headers, body)
    }

    /// Whether the status is in the `2xx` range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the value of the first header matching `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// `Transport` sends one request and returns the response, whatever its
/// status.
///
/// Only failures to exchange bytes with the server are errors here. Status
/// codes are interpreted by the request pipeline.
pub trait Transport: Send + Sync {
    /// Send the request and read the full response.
    fn send(&self, req: HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl<D, T> Transport for T
where
    D: Transport,
    T: Deref<Target = D> + Send + Sync,
{
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.deref().send(req).await
    }
}

/// `TransportClient` holds a type that can implement the interface of
/// [`Transport`].
#[derive(Clone)]
pub struct TransportClient {
    pub(crate) inner: Arc<dyn BoxedTransport + Send + Sync>,
}

impl TransportClient {
    /// Create a new `TransportClient` from any [`Transport`].
    pub fn new<T>(transport: T) -> Self
    where
        T: Transport + 'static,
    {
        let inner = TransportInner::new(transport);
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl Transport for TransportClient {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        self.inner.send_boxed(req).await
    }
}

impl Debug for TransportClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportClient")
            .field("inner", &"Transport")
            .finish()
    }
}
