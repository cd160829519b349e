//! Client for the Scalekit identity provider.
//!
//! Speaks the provider's OAuth surface directly: authorization URL
//! construction, authorization-code exchange, userinfo fetch, and refresh
//! token redemption.

use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Scopes requested from the provider.
const SCOPE: &str = "openid profile email";

/// Timeout applied to every provider call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider endpoints and client credentials.
#[derive(Debug, Clone)]
pub struct ScalekitConfig {
    /// Base URL of the provider environment, without a trailing slash.
    pub env_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Absolute URL the provider sends the browser back to.
    pub redirect_uri: String,
}

impl ScalekitConfig {
    /// Whether all provider credentials are present. The SSO endpoints stay
    /// mounted either way; calls against an unconfigured provider fail and
    /// surface as a generic upstream error.
    pub fn is_configured(&self) -> bool {
        !self.env_url.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    fn require_configured(&self) -> Result<(), ScalekitError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(ScalekitError::NotConfigured)
        }
    }
}

/// Token payload from the provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Profile from the provider's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable subject id the provider assigns to the end user.
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// HTTP client for the provider.
pub struct ScalekitClient {
    config: ScalekitConfig,
    http: reqwest::Client,
}

impl ScalekitClient {
    pub fn new(config: ScalekitConfig) -> Result<Self, ScalekitError> {
        if !config.is_configured() {
            warn!("Scalekit environment variables not set. Scalekit authentication will not work.");
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ScalekitError::Request)?;

        Ok(Self { config, http })
    }

    /// Build the authorization URL the browser navigates to, carrying the
    /// CSRF state.
    pub fn authorization_url(&self, state: &str) -> Result<String, ScalekitError> {
        if self.config.env_url.is_empty() || self.config.client_id.is_empty() {
            return Err(ScalekitError::NotConfigured);
        }

        let mut url = Url::parse(&format!("{}/oauth2/authorize", self.config.env_url))
            .map_err(ScalekitError::Url)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", SCOPE)
            .append_pair("state", state);

        Ok(url.into())
    }

    /// Exchange an authorization code for provider tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ScalekitError> {
        self.config.require_configured()?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(format!("{}/oauth2/token", self.config.env_url))
            .form(&params)
            .send()
            .await
            .map_err(ScalekitError::Request)?;

        Self::parse_json(response).await
    }

    /// Fetch the user profile with an access token.
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserProfile, ScalekitError> {
        if self.config.env_url.is_empty() {
            return Err(ScalekitError::NotConfigured);
        }

        let response = self
            .http
            .get(format!("{}/userinfo", self.config.env_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ScalekitError::Request)?;

        Self::parse_json(response).await
    }

    /// Redeem a refresh token for a new token set.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, ScalekitError> {
        self.config.require_configured()?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(format!("{}/oauth2/token", self.config.env_url))
            .form(&params)
            .send()
            .await
            .map_err(ScalekitError::Request)?;

        Self::parse_json(response).await
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ScalekitError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScalekitError::Provider { status, body });
        }
        response.json().await.map_err(ScalekitError::Request)
    }
}

/// Errors talking to the identity provider.
#[derive(Debug)]
pub enum ScalekitError {
    /// Provider environment URL or client credentials are not set.
    NotConfigured,
    /// The environment URL does not parse.
    Url(url::ParseError),
    /// Network or decoding failure.
    Request(reqwest::Error),
    /// The provider answered with a non-success status.
    Provider {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl std::fmt::Display for ScalekitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalekitError::NotConfigured => write!(f, "Scalekit environment variables not set"),
            ScalekitError::Url(e) => write!(f, "Invalid Scalekit environment URL: {}", e),
            ScalekitError::Request(e) => write!(f, "Scalekit request failed: {}", e),
            ScalekitError::Provider { status, body } => {
                write!(f, "Scalekit returned {}: {}", status, body)
            }
        }
    }
}

impl std::error::Error for ScalekitError {}
