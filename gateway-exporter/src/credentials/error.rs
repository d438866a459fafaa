//! Credential error types.

use std::time::Duration;

use enphase_client::EnphaseError;
use thiserror::Error;

/// Errors that can occur while obtaining or waiting for a gateway token.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Login against the identity service failed.
    #[error("Session exchange failed: {0}")]
    SessionExchange(#[source] EnphaseError),

    /// Exchanging the session id for a gateway token failed.
    #[error("Token exchange failed: {0}")]
    TokenExchange(#[source] EnphaseError),

    /// A refresh cycle did not complete in time.
    #[error("Refresh timed out after {0:?}")]
    RefreshTimeout(Duration),

    /// No token became available before the startup deadline.
    #[error("Timed out after {0:?} waiting for the first gateway token")]
    ReadyTimeout(Duration),
}

impl CredentialError {
    /// Check if the identity service rejected the account itself.
    pub fn is_rejected(&self) -> bool {
        match self {
            Self::SessionExchange(e) | Self::TokenExchange(e) => e.is_unauthorized(),
            _ => false,
        }
    }
}
