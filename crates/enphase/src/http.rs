use std::{sync::OnceLock, time::Duration};

use reqwest::{Client, ClientBuilder};
use tracing::debug;
use url::Url;

use crate::error::{EnphaseError, Result};

/// Install the process-wide rustls crypto provider once.
///
/// reqwest is built without a bundled provider, so this must run before the
/// first client is constructed.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Builder for the cloud identity client: 30s overall, 15s connect.
pub(crate) fn identity_client_builder() -> ClientBuilder {
    install_rustls_provider();
    Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(15))
        .tcp_keepalive(Duration::from_secs(15))
}

/// Builder for the on-premise gateway client.
///
/// The gateway sits on a private address and serves a self-signed
/// certificate, so verification is off for this client only.
pub(crate) fn gateway_client_builder() -> ClientBuilder {
    install_rustls_provider();
    Client::builder()
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .danger_accept_invalid_certs(true)
}

pub(crate) fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| EnphaseError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
