//! Request descriptor and response types exchanged with the transport

use std::fmt;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::envelope::ApiErrorDetails;

/// One logical HTTP call against the backend.
///
/// `path` is relative to the backend base URL and may carry a query string.
/// `retried` is the per-request RetryMark: once set, the request has used
/// its single renewal-and-replay cycle. `authorized_with` records the access
/// token the request was decorated with, so a late expiry signal can be told
/// apart from one that predates a renewal.
#[derive(Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Front-end route the caller was on when it issued the request.
    pub origin: Option<String>,
    retried: bool,
    authorized_with: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            origin: None,
            retried: false,
            authorized_with: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Path without its query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Set the RetryMark. There is no way to unset it.
    pub fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Access token this request was last decorated with, if any.
    pub fn authorized_with(&self) -> Option<&str> {
        self.authorized_with.as_deref()
    }

    pub fn record_authorization(&mut self, access_token: Option<String>) {
        self.authorized_with = access_token;
    }

    /// "METHOD /path" label for logs and queue inspection.
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

// Hand-written so tokens never end up in logs.
impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers.len())
            .field("body_len", &self.body.as_ref().map(|b| b.len()))
            .field("origin", &self.origin)
            .field("retried", &self.retried)
            .field("authorized", &self.authorized_with.is_some())
            .finish()
    }
}

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// User-facing error details, read from the backend envelope when the
    /// body carries one.
    pub fn error_details(&self) -> ApiErrorDetails {
        ApiErrorDetails::from_response(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_strips_query() {
        let req = RequestDescriptor::get("/courses?page=2&size=10");
        assert_eq!(req.route(), "/courses");
        assert_eq!(RequestDescriptor::get("/users/me").route(), "/users/me");
    }

    #[test]
    fn retry_mark_starts_unset() {
        let mut req = RequestDescriptor::post("/enrollments");
        assert!(!req.is_retried());
        req.mark_retried();
        assert!(req.is_retried());
        assert!(req.clone().is_retried(), "clones keep the mark");
    }

    #[test]
    fn with_json_sets_body_and_content_type() {
        let req = RequestDescriptor::post("/enrollments")
            .with_json(&serde_json::json!({"courseId": 7}))
            .unwrap();
        assert_eq!(req.headers[CONTENT_TYPE], "application/json");
        let body: serde_json::Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["courseId"], 7);
    }

    #[test]
    fn describe_includes_method_and_path() {
        assert_eq!(RequestDescriptor::get("/courses/1").describe(), "GET /courses/1");
    }

    #[test]
    fn debug_hides_authorization_token() {
        let mut req = RequestDescriptor::get("/users/me");
        req.record_authorization(Some("at_secret".into()));
        let debug = format!("{req:?}");
        assert!(!debug.contains("at_secret"), "token leaked: {debug}");
        assert!(debug.contains("authorized: true"));
    }

    #[test]
    fn response_json_decodes_body() {
        let resp = Response::new(StatusCode::OK, r#"{"id":1,"title":"Rust 101"}"#);
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["title"], "Rust 101");
        assert!(resp.is_success());
    }
}
