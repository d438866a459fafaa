//! HTTP clients for Enphase solar installations.
//!
//! - [`IdentityClient`]: Enlighten login and gateway token exchange
//! - [`GatewayClient`]: production readings from the local Envoy gateway

mod error;
mod gateway;
mod http;
mod identity;

pub use error::{EnphaseError, Result};
pub use gateway::{GatewayClient, PRODUCTION_PATH, Production};
pub use http::install_rustls_provider;
pub use identity::{IdentityClient, IdentityEndpoints, LOGIN_URL, TOKEN_URL};
