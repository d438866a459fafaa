//! Enlighten identity service: session login and gateway token exchange.
//!
//! Obtaining a gateway bearer token is a two-step flow:
//! 1. **Login** via `login.json` with form-encoded credentials, yielding a `session_id`
//! 2. **Token** via `entrez` with `{session_id, serial_num, username}`; the raw
//!    response body is the token

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{EnphaseError, Result};
use crate::http::{identity_client_builder, parse_url};

/// Default Enlighten login endpoint.
pub const LOGIN_URL: &str = "https://enlighten.enphaseenergy.com/login/login.json";

/// Default Entrez token endpoint.
pub const TOKEN_URL: &str = "https://entrez.enphaseenergy.com/tokens";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    session_id: &'a str,
    serial_num: &'a str,
    username: &'a str,
}

/// Login and token endpoints of the identity service.
#[derive(Debug, Clone)]
pub struct IdentityEndpoints {
    pub login_url: Url,
    pub token_url: Url,
}

impl IdentityEndpoints {
    pub fn new(login_url: &str, token_url: &str) -> Result<Self> {
        Ok(Self {
            login_url: parse_url(login_url)?,
            token_url: parse_url(token_url)?,
        })
    }
}

impl Default for IdentityEndpoints {
    fn default() -> Self {
        Self {
            login_url: Url::parse(LOGIN_URL).expect("LOGIN_URL is a valid URL"),
            token_url: Url::parse(TOKEN_URL).expect("TOKEN_URL is a valid URL"),
        }
    }
}

/// Client for the Enlighten identity service.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: Client,
    endpoints: IdentityEndpoints,
}

impl IdentityClient {
    /// Create a client with the default timeouts.
    pub fn new(endpoints: IdentityEndpoints) -> Result<Self> {
        let client = identity_client_builder().build()?;
        Ok(Self { client, endpoints })
    }

    /// Create a client on top of an existing `reqwest::Client`.
    pub fn with_client(client: Client, endpoints: IdentityEndpoints) -> Self {
        Self { client, endpoints }
    }

    /// Log in with username and password and return the session id.
    #[instrument(skip(self, password))]
    pub async fn fetch_session_id(&self, username: &str, password: &str) -> Result<String> {
        debug!("Fetching session id");

        let response = self
            .client
            .post(self.endpoints.login_url.clone())
            .form(&[("user[email]", username), ("user[password]", password)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(EnphaseError::unexpected_status(
                status,
                self.endpoints.login_url.as_str(),
                body,
            ));
        }

        let login: LoginResponse = serde_json::from_str(&body)?;

        debug!("Session id fetched");
        Ok(login.session_id)
    }

    /// Exchange a session id for a gateway bearer token.
    ///
    /// The token is returned verbatim; the service replies with the bare JWT
    /// as the body.
    #[instrument(skip(self, session_id))]
    pub async fn fetch_token(
        &self,
        session_id: &str,
        serial: &str,
        username: &str,
    ) -> Result<String> {
        debug!("Fetching gateway token");

        let response = self
            .client
            .post(self.endpoints.token_url.clone())
            .json(&TokenRequest {
                session_id,
                serial_num: serial,
                username,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(EnphaseError::unexpected_status(
                status,
                self.endpoints.token_url.as_str(),
                body,
            ));
        }

        debug!("Gateway token fetched");
        Ok(body)
    }
}
