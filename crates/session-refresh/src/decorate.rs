//! Attaching the access token to outgoing requests

use reqwest::header::{AUTHORIZATION, HeaderValue};
use session_auth::Credentials;
use transport::RequestDescriptor;

use crate::error::{Error, Result};

/// Attach the current access token, if any, as a bearer credential.
///
/// Without credentials the request goes out as-is; the backend rejecting it
/// is an expected outcome handled by the classifier.
pub fn decorate(request: RequestDescriptor, credentials: Option<&Credentials>) -> Result<RequestDescriptor> {
    match credentials {
        Some(credentials) => authorize(request, &credentials.access_token),
        None => Ok(request),
    }
}

/// Replace any `Authorization` header with `Bearer <access_token>`.
pub fn authorize(mut request: RequestDescriptor, access_token: &str) -> Result<RequestDescriptor> {
    let mut value = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| Error::InvalidToken("access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    request.headers.insert(AUTHORIZATION, value);
    request.record_authorization(Some(access_token.to_string()));
    Ok(request)
}
