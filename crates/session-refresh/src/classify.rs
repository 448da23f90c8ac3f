//! Expiry detection for completed requests
//!
//! The backend answers a missing, expired or revoked access token with 401.
//! 403 means the token is fine but the user lacks permission, so it is an
//! ordinary failure like any other status.

use reqwest::StatusCode;
use session_auth::Endpoints;
use transport::{RequestDescriptor, Response};

/// Status the backend uses to say "the access token is no good".
pub const EXPIRY_STATUS: StatusCode = StatusCode::UNAUTHORIZED;

/// Whether a completed request may enter the renewal-and-replay cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Expiry signal on a first attempt against a non-auth endpoint.
    Recoverable,
    /// Anything else: success, ordinary failure, transport failure, a
    /// request already replayed once, or an auth endpoint.
    NotRecoverable,
}

/// Whether the outcome carries the expiry signal.
pub fn is_expiry_signal(outcome: &transport::Result<Response>) -> bool {
    matches!(outcome, Ok(response) if response.status == EXPIRY_STATUS)
}

/// Decide whether `outcome` of `request` should engage the coordinator.
pub fn classify(
    outcome: &transport::Result<Response>,
    request: &RequestDescriptor,
    endpoints: &Endpoints,
) -> Classification {
    if !is_expiry_signal(outcome) {
        return Classification::NotRecoverable;
    }
    if request.is_retried() || endpoints.is_excluded(request.route()) {
        return Classification::NotRecoverable;
    }
    Classification::Recoverable
}
