use async_trait::async_trait;
use enphase_client::{EnphaseError, GatewayClient, Production};

/// Something that reports production counters for a bearer token.
#[async_trait]
pub trait ProductionSource: Send + Sync {
    async fn fetch_production(&self, token: &str) -> Result<Production, EnphaseError>;
}

#[async_trait]
impl ProductionSource for GatewayClient {
    async fn fetch_production(&self, token: &str) -> Result<Production, EnphaseError> {
        GatewayClient::fetch_production(self, token).await
    }
}
