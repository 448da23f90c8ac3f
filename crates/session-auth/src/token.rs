//! Sign-in, renewal and sign-out exchanges with the backend
//!
//! Sign-in and renewal both answer with an `AuthenticationResponse`
//! carrying a fresh token pair. The backend rotates the renewal token on
//! every renewal, so the pair from the response always replaces the stored
//! one as a whole.
//!
//! All exchanges go through the same `Transport` as ordinary requests and
//! therefore share its timeout.

use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use transport::{RequestDescriptor, Response, Transport};

use crate::constants::Endpoints;
use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Body of a successful sign-in or renewal.
///
/// `expires_in` is the access token lifetime in milliseconds. Only the two
/// tokens are required; profile fields are passed through to callers.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl std::fmt::Debug for AuthenticationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl AuthenticationResponse {
    /// The token pair carried by this response.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.access_token.clone(), self.refresh_token.clone())
    }
}

impl From<AuthenticationResponse> for Credentials {
    fn from(response: AuthenticationResponse) -> Self {
        Credentials::new(response.access_token, response.refresh_token)
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

/// Exchange email and password for a token pair.
pub async fn sign_in(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    email: &str,
    password: &str,
) -> Result<AuthenticationResponse> {
    let request = RequestDescriptor::post(endpoints.sign_in.as_str())
        .with_json(&SignInRequest { email, password })
        .map_err(|e| Error::TokenExchange(format!("encoding sign-in request: {e}")))?;

    let response = transport.send(&request).await?;
    if !response.is_success() {
        let details = response.error_details();
        if response.status.as_u16() == 401 {
            return Err(Error::InvalidCredentials(details.message));
        }
        return Err(Error::TokenExchange(format!(
            "sign-in returned {}: {}",
            response.status, details.message
        )));
    }

    let auth = parse(&response, "sign-in")?;
    debug!(user_id = ?auth.user_id, "signed in");
    Ok(auth)
}

/// Exchange a renewal token for a fresh token pair.
///
/// A 401 or 403 means the renewal token is expired or revoked.
pub async fn renew(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    renewal_token: &str,
) -> Result<AuthenticationResponse> {
    let request = RequestDescriptor::post(endpoints.renewal.as_str())
        .with_json(&RenewalRequest {
            refresh_token: renewal_token,
        })
        .map_err(|e| Error::TokenExchange(format!("encoding renewal request: {e}")))?;

    let response = transport.send(&request).await?;
    let status = response.status;
    if !status.is_success() {
        let details = response.error_details();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "renewal token rejected ({status}): {}",
                details.message
            )));
        }
        return Err(Error::TokenExchange(format!(
            "renewal returned {status}: {}",
            details.message
        )));
    }

    parse(&response, "renewal")
}

/// Tell the backend the session is over.
///
/// The caller clears its own credentials regardless of the outcome.
pub async fn sign_out(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    access_token: &str,
) -> Result<()> {
    let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
        .map_err(|_| Error::CredentialParse("access token is not a valid header value".into()))?;
    let request =
        RequestDescriptor::post(endpoints.sign_out.as_str()).with_header(AUTHORIZATION, bearer);

    let response = transport.send(&request).await?;
    if !response.is_success() {
        warn!(status = %response.status, "backend sign-out failed");
        return Err(Error::TokenExchange(format!(
            "sign-out returned {}",
            response.status
        )));
    }
    Ok(())
}

fn parse(response: &Response, exchange: &str) -> Result<AuthenticationResponse> {
    response
        .json::<AuthenticationResponse>()
        .map_err(|e| Error::TokenExchange(format!("invalid {exchange} response: {e}")))
}
