//! Transport abstraction for the e-learning backend
//!
//! Defines the `Transport` trait that decouples session handling from the
//! HTTP client. `HttpTransport` is the reqwest-backed implementation used in
//! production; tests substitute scripted transports that count calls and
//! gate responses.
//!
//! The transport is deliberately dumb: it sends one `RequestDescriptor` and
//! hands back whatever came back. It never inspects bodies, never retries and
//! never touches credentials.

pub mod envelope;
pub mod http;
pub mod request;

pub use envelope::{ApiErrorDetails, ApiResponse};
pub use http::{DEFAULT_TIMEOUT, HttpTransport};
pub use request::{RequestDescriptor, Response};

use std::future::Future;
use std::pin::Pin;

/// Transport-level failures: the exchange never produced an HTTP response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("response body read failed: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connection",
            TransportError::Request(_) => "request",
            TransportError::Body(_) => "body",
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Boxed future returned by `Transport::send`.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>>;

/// Opaque "send request, get response-or-failure" primitive.
///
/// Uses a boxed future return type so the session layer can hold an
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Send one request. Any HTTP status, including 4xx/5xx, is `Ok`.
    fn send<'a>(&'a self, request: &'a RequestDescriptor) -> SendFuture<'a>;
}
