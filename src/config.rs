//! Static provider and application configuration.

use serde::Deserialize;

use crate::error::{ConnectError, Result};

const DEFAULT_AUTHORIZE_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const DEFAULT_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const DEFAULT_PROFILE_URL: &str = "https://api.linkedin.com/v2/userinfo";
const DEFAULT_SCOPE: &str = "openid profile w_member_social";

/// OAuth client configuration for the professional-network provider.
///
/// The endpoint URLs default to the provider's production endpoints and are
/// overridable for tests and staging environments.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Fixed same-origin redirect URI registered with the provider.
    pub redirect_uri: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_profile_url")]
    pub profile_url: String,
    /// Space-separated scope list.
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_authorize_url() -> String {
    DEFAULT_AUTHORIZE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_profile_url() -> String {
    DEFAULT_PROFILE_URL.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl ProviderConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            profile_url: default_profile_url(),
            scope: default_scope(),
        }
    }

    /// Read configuration from `CONNECTFLOW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let require = |key: &str| {
            std::env::var(key).map_err(|_| ConnectError::config(format!("{key} is not set")))
        };
        let mut config = Self::new(
            require("CONNECTFLOW_CLIENT_ID")?,
            require("CONNECTFLOW_CLIENT_SECRET")?,
            require("CONNECTFLOW_REDIRECT_URI")?,
        );
        if let Ok(v) = std::env::var("CONNECTFLOW_AUTHORIZE_URL") {
            config.authorize_url = v;
        }
        if let Ok(v) = std::env::var("CONNECTFLOW_TOKEN_URL") {
            config.token_url = v;
        }
        if let Ok(v) = std::env::var("CONNECTFLOW_PROFILE_URL") {
            config.profile_url = v;
        }
        if let Ok(v) = std::env::var("CONNECTFLOW_SCOPE") {
            config.scope = v;
        }
        Ok(config)
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = url.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}
