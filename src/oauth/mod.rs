//! The connection lifecycle service: initiate, complete, status, disconnect.

pub mod authorize;
pub mod exchange;
pub mod status;

pub use authorize::AuthorizationRequest;
pub use status::{resolve_status, ConnectionStatus};

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ProviderConfig;
use crate::error::{ConnectError, Result};
use crate::store::{ConnectionProfile, RecordStore};
use exchange::ProviderClient;

/// How long an issued state value remains acceptable, measured from
/// `oauth_initiated_at`.
const AUTHORIZATION_WINDOW_MINUTES: i64 = 10;

/// Drives a user's provider linkage through its lifecycle. All operations
/// take an explicit `user_id`; there is no ambient session.
pub struct ConnectionService {
    store: Arc<dyn RecordStore>,
    client: ProviderClient,
    clock: Arc<dyn Clock>,
}

impl ConnectionService {
    pub fn new(store: Arc<dyn RecordStore>, config: ProviderConfig) -> Self {
        Self {
            store,
            client: ProviderClient::new(config.clone()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn config(&self) -> &ProviderConfig {
        self.client.config()
    }

    /// Mint a fresh state, persist it, and build the authorization URL.
    /// Overwrites any prior in-flight attempt: at most one authorization
    /// attempt per user at a time, and starting a second invalidates the
    /// first.
    pub async fn initiate(&self, user_id: &str) -> Result<AuthorizationRequest> {
        let mut record = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| ConnectError::UserNotFound(user_id.to_string()))?;

        let state = authorize::mint_state();
        record.begin_attempt(state.clone(), self.clock.now());
        self.store.put(user_id, &record).await?;

        let auth_url = authorize::build_authorize_url(self.config(), &state);
        debug!(target: "connectflow", user = %user_id, "authorization attempt initiated");
        Ok(AuthorizationRequest { auth_url, state })
    }

    /// Verify the callback, exchange the code, fetch the profile, and commit.
    ///
    /// The commit clears `oauth_state` in the same store update that writes
    /// the tokens, so a state value is spent at most once. Any failure after
    /// verification clears the state only, leaving prior tokens untouched;
    /// tokens from a partially validated exchange are never persisted.
    pub async fn complete(&self, user_id: &str, code: &str, state: &str) -> Result<ConnectionProfile> {
        let record = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| ConnectError::UserNotFound(user_id.to_string()))?;

        let in_flight = record.oauth_state.as_deref();
        if in_flight != Some(state) {
            warn!(target: "connectflow", user = %user_id, had_attempt = in_flight.is_some(),
                "callback state mismatch");
            return Err(ConnectError::InvalidState);
        }
        let Some(initiated_at) = record.oauth_initiated_at else {
            // State without its paired timestamp; treat as forged.
            return Err(ConnectError::InvalidState);
        };

        let now = self.clock.now();
        if now - initiated_at > Duration::minutes(AUTHORIZATION_WINDOW_MINUTES) {
            warn!(target: "connectflow", user = %user_id, "authorization window exceeded");
            self.abandon_attempt(user_id, state).await?;
            return Err(ConnectError::ExpiredAuthorizationWindow);
        }

        let token = match self.client.exchange_code(code).await {
            Ok(token) => token,
            Err(e) => {
                self.abandon_attempt(user_id, state).await?;
                return Err(e);
            }
        };
        let profile = match self.client.fetch_profile(&token.access_token).await {
            Ok(profile) => profile,
            Err(e) => {
                self.abandon_attempt(user_id, state).await?;
                return Err(e);
            }
        };

        let mut updated = record.clone();
        updated.commit_tokens(
            token.access_token,
            token.refresh_token,
            now + Duration::seconds(token.expires_in),
            profile.clone(),
            now,
        );
        if !self.store.update_if_state(user_id, state, &updated).await? {
            // The state was spent or replaced while we were talking to the
            // provider; this attempt loses.
            warn!(target: "connectflow", user = %user_id, "state spent concurrently");
            return Err(ConnectError::InvalidState);
        }

        info!(target: "connectflow", user = %user_id,
            member = %profile.provider_member_id, "provider connection established");
        Ok(profile)
    }

    /// Classify the user's linkage. Pure read.
    pub async fn status(&self, user_id: &str) -> Result<ConnectionStatus> {
        let record = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| ConnectError::UserNotFound(user_id.to_string()))?;
        Ok(resolve_status(&record, self.clock.now()))
    }

    /// Null every provider field, including an in-flight attempt. Idempotent.
    pub async fn disconnect(&self, user_id: &str) -> Result<()> {
        let mut record = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| ConnectError::UserNotFound(user_id.to_string()))?;
        record.reset();
        self.store.put(user_id, &record).await?;
        info!(target: "connectflow", user = %user_id, "provider connection cleared");
        Ok(())
    }

    /// Clear a failed attempt's state without touching prior tokens. Guarded
    /// by state equality so it cannot clobber a newer attempt.
    async fn abandon_attempt(&self, user_id: &str, state: &str) -> Result<()> {
        if let Some(mut record) = self.store.get(user_id).await? {
            if record.oauth_state.as_deref() == Some(state) {
                record.clear_attempt();
                let _ = self.store.update_if_state(user_id, state, &record).await?;
            }
        }
        Ok(())
    }
}
