//! Anti-forgery state minting and authorization URL construction.

use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;

use crate::config::ProviderConfig;

/// Length of the minted CSRF state token.
const STATE_LEN: usize = 32;

/// What a caller needs to send the user to the provider: the URL to open and
/// the state value the eventual callback must echo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub auth_url: String,
    pub state: String,
}

/// Mint a cryptographically random single-use state token.
pub(crate) fn mint_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

/// Append the fixed authorization query string to the provider's authorize
/// endpoint. No network call happens here.
pub(crate) fn build_authorize_url(config: &ProviderConfig, state: &str) -> String {
    let mut url = format!(
        "{}?response_type=code&client_id={}&redirect_uri={}",
        config.authorize_url,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
    );
    url.push_str(&format!("&state={}", urlencoding::encode(state)));
    if !config.scope.is_empty() {
        url.push_str(&format!("&scope={}", urlencoding::encode(&config.scope)));
    }
    url
}
