//! Error types for authenticated sends

use transport::TransportError;

/// Outcomes of an authenticated send that are not a backend response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The session cannot be recovered; the caller must sign in again.
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid access token: {0}")]
    InvalidToken(String),
}

impl Error {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired(_))
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
