//! Service-specific error types and the JSON error shape
//!
//! Every error the proxy produces itself (as opposed to passing through a
//! backend response) is rendered as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use transport::TransportError;

/// Failures of the session endpoints (`/session/login`, `/session/logout`).
///
/// Forwarded requests never produce these; the proxy handler maps
/// `session_refresh::Error` to a response directly.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("backend timed out: {0}")]
    BackendTimeout(String),

    #[error("backend exchange failed: {0}")]
    Backend(String),

    #[error("credential store failure: {0}")]
    CredentialStore(String),
}

impl From<session_auth::Error> for Error {
    fn from(error: session_auth::Error) -> Self {
        match error {
            session_auth::Error::InvalidCredentials(message) => Error::InvalidCredentials(message),
            session_auth::Error::Transport(e @ TransportError::Timeout(_)) => {
                Error::BackendTimeout(e.to_string())
            }
            session_auth::Error::Io(message) | session_auth::Error::CredentialParse(message) => {
                Error::CredentialStore(message)
            }
            other => Error::Backend(other.to_string()),
        }
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            Error::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Backend(_) => StatusCode::BAD_GATEWAY,
            Error::CredentialStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Error::InvalidCredentials(_) => "invalid_credentials",
            _ => "proxy_error",
        }
    }

    pub fn into_error_response(self, request_id: &str) -> Response {
        error_response(self.status(), self.error_type(), &self.to_string(), request_id)
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

/// JSON error response: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: &str,
) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    json_response(status, body)
}

pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Fresh request id in the `req_<uuid>` format.
pub fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}
