use super::{HttpRequest, HttpResponse, Method, Transport};
use crate::error::{Error, ErrorRepr, Result};

use std::time::Duration;

/// [`Transport`] backed by a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport(reqwest::Client);

impl ReqwestTransport {
    /// Create a new `ReqwestTransport` with a request timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ErrorRepr::Config(format!("building http client: {e}")))?;
        Ok(Self(client))
    }

    /// Create a new `ReqwestTransport` from an existing `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self(client)
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let method = match req.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.0.request(method, req.url.as_str());
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if req.method == Method::Post {
            builder = builder.body(req.body);
        }

        let resp = builder.send().await.map_err(transport_err)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(transport_err)?;

        Ok(HttpResponse::new(status, headers, body))
    }
}

fn transport_err(e: reqwest::Error) -> Error {
    ErrorRepr::Transport {
        endpoint: None,
        source: Box::new(e),
    }
    .into()
}
