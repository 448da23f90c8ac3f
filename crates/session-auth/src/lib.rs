//! Session credentials and backend authentication exchanges
//!
//! Holds the signed-in session's token pair and talks to the backend's
//! authentication endpoints. Knows nothing about expiry recovery; that lives
//! in `session-refresh`, which drives `renew` and writes the store.
//!
//! Session flow:
//! 1. `token::sign_in()` exchanges email + password for a token pair
//! 2. The pair is stored via `credentials::CredentialStore::set()`
//! 3. On expiry, the coordinator calls `token::renew()` with the stored
//!    renewal token and stores the rotated pair
//! 4. `token::sign_out()` ends the backend session, then the store is cleared

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialStore, Credentials};
pub use error::{Error, Result};
pub use token::{AuthenticationResponse, renew, sign_in, sign_out};
