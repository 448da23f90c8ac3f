//! reqwest-backed transport
//!
//! Joins the backend base URL with each descriptor's path, applies the
//! per-request timeout and returns the response verbatim. Error statuses are
//! not failures at this layer.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::debug;

use crate::request::{RequestDescriptor, Response};
use crate::{SendFuture, Transport, TransportError};

/// Default per-request timeout, matching the browser client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport for one backend base URL.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> SendFuture<'a> {
        Box::pin(async move {
            let url = self.url_for(&request.path);

            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .headers(request.headers.clone())
                .timeout(self.timeout);

            if let Some(body) = &request.body {
                if !request.headers.contains_key(CONTENT_TYPE) {
                    builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(format!("{} after {}s", request.describe(), self.timeout.as_secs()))
                } else if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(format!("{} body after {}s", request.describe(), self.timeout.as_secs()))
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;

            debug!(
                method = %request.method,
                path = %request.route(),
                status = status.as_u16(),
                "backend responded"
            );

            Ok(Response {
                status,
                headers,
                body,
            })
        })
    }
}
