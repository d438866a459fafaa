//! Gateway credential management.
//!
//! The gateway only accepts requests carrying a bearer token minted by the
//! Enlighten identity service. Minting is a two-step exchange:
//!
//! 1. log in with the account credentials to obtain a session id
//! 2. trade the session id (plus gateway serial) for a token
//!
//! [`CredentialManager`] runs that exchange once at startup and then on a
//! fixed period, exposing the latest token to the poll loop.

mod error;
mod manager;
mod source;
mod types;

pub use error::CredentialError;
pub use manager::{
    CredentialManager, CredentialManagerConfig, DEFAULT_REFRESH_PERIOD, DEFAULT_REFRESH_TIMEOUT,
};
pub use source::{EnlightenTokenSource, TokenSource};
pub use types::{Account, Credential};
