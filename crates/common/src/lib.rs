//! Shared types for the e-learning session proxy workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
