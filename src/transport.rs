//! HTTP exchange primitive the sessions are driven through.
//!
//! A transport only moves bytes: it never looks at the status code or the body.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Url;
use ureq::Agent;

use crate::{error::TransportError, prelude::*};

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl HttpRequest {
    fn to_http(&self) -> Result<http::Request<()>, TransportError> {
        let mut builder = http::Request::builder().method(self.method.clone()).uri(self.url.as_str());
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        Ok(builder.body(())?)
    }
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Blocking transport.
pub trait Transport {
    /// Acquire the connection, called once when the session opens.
    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Release the connection, called exactly once when the session closes.
    fn release(&mut self) {}
}

/// Non-blocking transport.
#[async_trait]
pub trait AsyncTransport: Send {
    /// Acquire the connection, called once when the session opens.
    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Release the connection, called exactly once when the session closes.
    ///
    /// Not `async`, so that it may run from [`Drop`].
    fn release(&mut self) {}
}

/// Blocking transport over [`ureq`].
pub struct UreqTransport {
    agent: Option<Agent>,
    timeout: Duration,
}

impl UreqTransport {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { agent: None, timeout }
    }
}

impl Transport for UreqTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let timeout = self.timeout;
        self.agent.get_or_insert_with(|| {
            Agent::config_builder()
                .timeout_global(Some(timeout))
                .http_status_as_error(false)
                .build()
                .into()
        });
        Ok(())
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(method = %request.method, path = request.url.path()))]
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.as_ref().ok_or_else(|| TransportError::new("the agent is released"))?;
        let mut response = agent.run(request.to_http()?)?;
        let status = response.status();
        let body = response.body_mut().read_to_vec()?;
        debug!(%status, n_bytes = body.len(), "received");
        Ok(HttpResponse { status, body })
    }

    fn release(&mut self) {
        self.agent = None;
    }
}

/// Non-blocking transport over [`reqwest`].
pub struct ReqwestTransport {
    client: Option<reqwest::Client>,
    timeout: Duration,
}

impl ReqwestTransport {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { client: None, timeout }
    }
}

#[async_trait]
impl AsyncTransport for ReqwestTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.client.is_none() {
            self.client = Some(reqwest::Client::builder().timeout(self.timeout).build()?);
        }
        Ok(())
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(method = %request.method, path = request.url.path()))]
    async fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = self.client.as_ref().ok_or_else(|| TransportError::new("the client is released"))?;
        let response = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!(%status, n_bytes = body.len(), "received");
        Ok(HttpResponse { status, body })
    }

    fn release(&mut self) {
        self.client = None;
    }
}
