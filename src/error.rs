//! Error taxonomy for the connection lifecycle.
//!
//! Every provider-facing and store-facing failure is converted into one of
//! these variants at the component boundary; raw provider error bodies are
//! logged, never carried verbatim to callers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConnectError>;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("record store error: {0}")]
    Persistence(String),

    #[error("authorization popup was blocked by the browser")]
    PopupBlocked,

    #[error("authorization timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("provider denied the authorization request: {0}")]
    ProviderDenied(String),

    #[error("state token does not match the in-flight authorization attempt")]
    InvalidState,

    #[error("authorization window has expired")]
    ExpiredAuthorizationWindow,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("profile fetch failed: {0}")]
    ProfileFetchFailed(String),

    #[error("unknown user: {0}")]
    UserNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ConnectError {
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn provider_denied(msg: impl Into<String>) -> Self {
        Self::ProviderDenied(msg.into())
    }

    pub fn token_exchange(msg: impl Into<String>) -> Self {
        Self::TokenExchangeFailed(msg.into())
    }

    pub fn profile_fetch(msg: impl Into<String>) -> Self {
        Self::ProfileFetchFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Failures that indicate a forged or replayed callback. These must never
    /// be retried automatically.
    pub fn is_security_relevant(&self) -> bool {
        matches!(self, Self::InvalidState | Self::ExpiredAuthorizationWindow)
    }
}
