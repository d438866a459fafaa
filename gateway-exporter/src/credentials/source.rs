//! Remote side of a refresh cycle.

use async_trait::async_trait;
use enphase_client::{EnphaseError, IdentityClient};

use super::types::Account;

/// The two remote calls that make up a refresh cycle.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Log in and return a session id.
    async fn fetch_session_id(&self) -> Result<String, EnphaseError>;

    /// Exchange a session id for a gateway token, returned verbatim.
    async fn fetch_token(&self, session_id: &str) -> Result<String, EnphaseError>;
}

/// [`TokenSource`] backed by the Enlighten identity service.
pub struct EnlightenTokenSource {
    client: IdentityClient,
    account: Account,
}

impl EnlightenTokenSource {
    pub fn new(client: IdentityClient, account: Account) -> Self {
        Self { client, account }
    }
}

#[async_trait]
impl TokenSource for EnlightenTokenSource {
    async fn fetch_session_id(&self) -> Result<String, EnphaseError> {
        self.client
            .fetch_session_id(&self.account.username, &self.account.password)
            .await
    }

    async fn fetch_token(&self, session_id: &str) -> Result<String, EnphaseError> {
        self.client
            .fetch_token(session_id, &self.account.serial, &self.account.username)
            .await
    }
}
