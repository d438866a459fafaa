use std::time::Duration;

use enphase_client::EnphaseError;
use thiserror::Error;

/// Why a single poll produced no reading.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Production fetch failed: {0}")]
    Fetch(#[source] EnphaseError),

    #[error("Poll timed out after {0:?}")]
    Timeout(Duration),

    #[error("Poll cancelled")]
    Cancelled,
}

impl PollError {
    /// Check if the gateway rejected the current token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_unauthorized())
    }
}
