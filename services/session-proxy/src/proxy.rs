//! HTTP forwarding through the authenticated client
//!
//! Receives inbound requests, strips hop-by-hop headers and any inbound
//! `Authorization`, and sends them to the backend as the signed-in user.
//! Backend responses, including 4xx/5xx, are returned verbatim. A session
//! that cannot be recovered becomes a `session_expired` 401 pointing the
//! front end at its sign-in route.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::Response;
use session_refresh::{AuthenticatedClient, Error as SessionError};
use tracing::{error, info, instrument, warn};
use transport::RequestDescriptor;

use crate::error::{error_response, json_response};
use crate::metrics::{record_request, record_upstream_error};

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Largest request body the proxy will buffer.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler
#[derive(Clone)]
pub struct ProxyState {
    pub client: AuthenticatedClient,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
}

/// Decrements the in-flight counter when the request finishes, however it
/// finishes.
struct InFlightGuard(Arc<AtomicU64>);

impl InFlightGuard {
    fn new(counter: Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Forward one inbound request and record its outcome.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<Body>,
    request_id: String,
) -> Response {
    let _in_flight = InFlightGuard::new(state.in_flight.clone());
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let method = request.method().to_string();

    let response = forward(state, request, &request_id).await;

    record_request(
        response.status().as_u16(),
        &method,
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn forward(
    state: &ProxyState,
    request: axum::http::Request<Body>,
    request_id: &str,
) -> Response {
    let (parts, body) = request.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            error!(error = %e, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                "proxy_error",
                &format!("invalid request body: {e}"),
                request_id,
            );
        }
    };

    let mut descriptor = RequestDescriptor::new(parts.method, path);
    descriptor.headers = forwardable_headers(&parts.headers);
    if !body.is_empty() {
        descriptor = descriptor.with_body(body);
    }
    if let Some(origin) = referer_route(&parts.headers) {
        descriptor = descriptor.with_origin(origin);
    }

    match state.client.send(descriptor).await {
        Ok(backend_response) => {
            let mut response = Response::builder().status(backend_response.status);
            for (name, value) in &backend_response.headers {
                if !is_hop_by_hop(name.as_str()) {
                    response = response.header(name, value);
                }
            }
            response
                .body(Body::from(backend_response.body))
                .unwrap_or_else(|e| {
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "proxy_error",
                        &format!("response build error: {e}"),
                        request_id,
                    )
                })
        }
        Err(SessionError::SessionExpired(reason)) => {
            info!(reason = %reason, "session expired, sign-in required");
            record_upstream_error("session_expired");
            session_expired_response(&reason, state.client.coordinator().sign_in_route(), request_id)
        }
        Err(SessionError::Transport(e)) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            record_upstream_error(e.kind());
            if e.is_timeout() {
                error!(error = %e, "backend timeout");
                error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "proxy_error",
                    &format!("backend timeout: {e}"),
                    request_id,
                )
            } else {
                error!(error = %e, "backend request failed");
                error_response(
                    StatusCode::BAD_GATEWAY,
                    "proxy_error",
                    &format!("backend error: {e}"),
                    request_id,
                )
            }
        }
        Err(e @ SessionError::InvalidToken(_)) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "stored access token unusable");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "proxy_error",
                &e.to_string(),
                request_id,
            )
        }
    }
}

/// 401 telling the front end to send the user to the sign-in route.
fn session_expired_response(reason: &str, sign_in_route: &str, request_id: &str) -> Response {
    json_response(
        StatusCode::UNAUTHORIZED,
        serde_json::json!({
            "error": {
                "type": "session_expired",
                "message": format!("session expired: {reason}"),
                "request_id": request_id,
                "sign_in": sign_in_route,
            }
        }),
    )
}

/// Inbound headers minus hop-by-hop ones and those the proxy owns.
fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name.as_str())
            || name == header::AUTHORIZATION
            || name == header::HOST
            || name == header::CONTENT_LENGTH
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Path of the page the request came from, taken from `Referer`.
fn referer_route(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let uri: Uri = referer.parse().ok()?;
    Some(uri.path().to_string())
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
