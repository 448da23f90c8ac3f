//! Authenticated transport with single-flight session renewal
//!
//! Wraps a `Transport` so every request carries the session's access token
//! and survives the token expiring underneath it. Pieces, leaves first:
//!
//! 1. `decorate` attaches the stored access token as a bearer credential
//! 2. `classify` decides whether a completed request hit the expiry signal
//!    and may recover
//! 3. `RefreshCoordinator` runs at most one renewal at a time and queues
//!    everyone else behind it
//! 4. `replay` re-sends a request once with the renewed token
//! 5. `AuthenticatedClient::send` strings the four together
//!
//! A failed renewal clears the credential store, rejects every queued
//! request with `Error::SessionExpired`, and emits one
//! `SessionEvent::Expired`.

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod decorate;
pub mod error;
pub mod replay;

#[cfg(test)]
mod testing;

pub use classify::{Classification, EXPIRY_STATUS, classify, is_expiry_signal};
pub use client::AuthenticatedClient;
pub use coordinator::{RefreshCoordinator, RefreshOptions, RefreshState, SessionEvent};
pub use decorate::{authorize, decorate};
pub use error::{Error, Result};
pub use replay::replay;
