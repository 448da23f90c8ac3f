//! Error types for session authentication operations

use transport::TransportError;

/// Errors from credential storage and backend authentication exchanges.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("no active session: {0}")]
    NoSession(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
