//! Local Envoy gateway: production readings.

use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{EnphaseError, Result};
use crate::http::{gateway_client_builder, parse_url};

/// Path of the production endpoint on the gateway.
pub const PRODUCTION_PATH: &str = "/api/v1/production";

/// Production counters reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Production {
    pub watt_hours_today: f64,
    pub watt_hours_seven_days: f64,
    pub watt_hours_lifetime: f64,
    pub watts_now: f64,
}

/// Client for a single Envoy gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    production_url: Url,
}

impl GatewayClient {
    /// Create a client for the gateway at `host` (an IP or hostname, optionally with port).
    pub fn new(host: &str) -> Result<Self> {
        let client = gateway_client_builder().build()?;
        Self::with_base_url(client, &format!("https://{host}"))
    }

    /// Create a client against an explicit base URL, e.g. `http://127.0.0.1:8080`.
    pub fn with_base_url(client: Client, base_url: &str) -> Result<Self> {
        let base = parse_url(base_url)?;
        let production_url = base.join(PRODUCTION_PATH).map_err(|e| EnphaseError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client,
            production_url,
        })
    }

    pub fn production_url(&self) -> &Url {
        &self.production_url
    }

    /// Fetch the current production counters.
    #[instrument(skip(self, token), fields(url = %self.production_url))]
    pub async fn fetch_production(&self, token: &str) -> Result<Production> {
        let response = self
            .client
            .get(self.production_url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(EnphaseError::unexpected_status(
                status,
                self.production_url.as_str(),
                body,
            ));
        }

        let production: Production = serde_json::from_str(&body)?;
        debug!(watts_now = production.watts_now, "Production fetched");
        Ok(production)
    }
}
