//! HTTP client for the provider's token and profile endpoints.

use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{ConnectError, Result};
use crate::store::ConnectionProfile;

/// Token endpoint response: `{access_token, refresh_token?, expires_in}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Raw profile endpoint body. Field names follow the provider's OpenID-style
/// userinfo shape; `sub`/`id` are accepted interchangeably.
#[derive(Debug, Clone, Deserialize)]
struct ProfileResponse {
    #[serde(alias = "id")]
    sub: String,
    name: String,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default, alias = "picture")]
    image_url: Option<String>,
    #[serde(default)]
    profile_url: Option<String>,
}

impl From<ProfileResponse> for ConnectionProfile {
    fn from(raw: ProfileResponse) -> Self {
        Self {
            provider_member_id: raw.sub,
            name: raw.name,
            headline: raw.headline,
            industry: raw.industry,
            image_url: raw.image_url,
            profile_url: raw.profile_url,
        }
    }
}

pub(crate) struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Exchange an authorization code for tokens. One POST to the token
    /// endpoint, form-encoded per the provider contract.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ConnectError::token_exchange(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(target: "connectflow", %status, %body, "token endpoint returned an error");
            return Err(ConnectError::token_exchange(format!(
                "token endpoint returned {status}"
            )));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ConnectError::token_exchange(format!("invalid token response: {e}")))
    }

    /// Fetch the provider profile with a freshly issued access token.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<ConnectionProfile> {
        let response = self
            .http
            .get(&self.config.profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ConnectError::profile_fetch(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(target: "connectflow", %status, %body, "profile endpoint returned an error");
            return Err(ConnectError::profile_fetch(format!(
                "profile endpoint returned {status}"
            )));
        }
        let raw = response
            .json::<ProfileResponse>()
            .await
            .map_err(|e| ConnectError::profile_fetch(format!("invalid profile response: {e}")))?;
        Ok(raw.into())
    }
}
