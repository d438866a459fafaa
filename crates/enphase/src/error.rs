//! Error types for the Enphase HTTP clients.

use thiserror::Error;

/// Errors returned by [`IdentityClient`](crate::IdentityClient) and
/// [`GatewayClient`](crate::GatewayClient).
#[derive(Debug, Error)]
pub enum EnphaseError {
    /// Transport-level failure (connect, TLS, timeout, body read).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote answered with something other than `200 OK`.
    #[error("Unexpected status {status} for {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured endpoint is not a valid absolute URL.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl EnphaseError {
    pub(crate) fn unexpected_status(
        status: reqwest::StatusCode,
        url: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::UnexpectedStatus {
            status: status.as_u16(),
            url: url.into(),
            body: body.into(),
        }
    }

    /// Check if the remote rejected the request with an auth status.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { status, .. } if *status == 401 || *status == 403)
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, EnphaseError>;
