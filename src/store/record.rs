//! The persisted per-user external-identity linkage record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Denormalized display data captured from the provider profile endpoint,
/// refreshed on each successful (re)connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub provider_member_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

impl ConnectionProfile {
    pub fn new(provider_member_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider_member_id: provider_member_id.into(),
            name: name.into(),
            headline: None,
            industry: None,
            image_url: None,
            profile_url: None,
        }
    }

    pub fn with_headline(mut self, headline: impl Into<String>) -> Self {
        self.headline = Some(headline.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Provider linkage state for one user. All fields null means the user has
/// never connected.
///
/// Invariants:
/// - `oauth_state` is set iff an authorization attempt is in flight, and is
///   always paired with `oauth_initiated_at`.
/// - `access_token` set implies `provider_member_id` and `token_expires_at`
///   are set.
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(default)]
    pub provider_member_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Single-use CSRF token, set at authorization start and cleared on
    /// completion or disconnect.
    #[serde(default)]
    pub oauth_state: Option<String>,
    #[serde(default)]
    pub oauth_initiated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub profile_snapshot: Option<ConnectionProfile>,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionRecord {
    pub fn attempt_in_flight(&self) -> bool {
        self.oauth_state.is_some()
    }

    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at.map(|exp| now > exp).unwrap_or(true)
    }

    /// Start an authorization attempt, overwriting any prior in-flight state.
    pub fn begin_attempt(&mut self, state: impl Into<String>, now: DateTime<Utc>) {
        self.oauth_state = Some(state.into());
        self.oauth_initiated_at = Some(now);
    }

    /// Drop the in-flight attempt, leaving any prior tokens untouched.
    pub fn clear_attempt(&mut self) {
        self.oauth_state = None;
        self.oauth_initiated_at = None;
    }

    /// Commit a completed exchange. Clears the in-flight state in the same
    /// mutation that stores the tokens.
    pub fn commit_tokens(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        token_expires_at: DateTime<Utc>,
        profile: ConnectionProfile,
        now: DateTime<Utc>,
    ) {
        self.provider_member_id = Some(profile.provider_member_id.clone());
        self.access_token = Some(access_token.into());
        self.refresh_token = refresh_token;
        self.token_expires_at = Some(token_expires_at);
        self.profile_snapshot = Some(profile);
        self.connected_at = Some(now);
        self.clear_attempt();
    }

    /// Null every provider field, including an in-flight attempt.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// Tokens are secrets; keep them out of debug output and logs.
impl std::fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("provider_member_id", &self.provider_member_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_expires_at", &self.token_expires_at)
            .field("oauth_state", &self.oauth_state.as_ref().map(|_| "<set>"))
            .field("oauth_initiated_at", &self.oauth_initiated_at)
            .field("profile_snapshot", &self.profile_snapshot)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn commit_clears_attempt_and_sets_tokens() {
        let now = Utc::now();
        let mut record = ConnectionRecord::default();
        record.begin_attempt("abc", now);
        assert!(record.attempt_in_flight());

        record.commit_tokens(
            "T",
            Some("R".to_string()),
            now + Duration::seconds(3600),
            ConnectionProfile::new("p1", "Ada"),
            now,
        );
        assert!(!record.attempt_in_flight());
        assert_eq!(record.provider_member_id.as_deref(), Some("p1"));
        assert_eq!(record.access_token.as_deref(), Some("T"));
        assert_eq!(record.connected_at, Some(now));
        assert!(!record.is_token_expired(now));
        assert!(record.is_token_expired(now + Duration::seconds(3601)));
    }

    #[test]
    fn reset_nulls_everything() {
        let now = Utc::now();
        let mut record = ConnectionRecord::default();
        record.begin_attempt("abc", now);
        record.commit_tokens("T", None, now, ConnectionProfile::new("p1", "Ada"), now);
        record.reset();
        assert_eq!(record, ConnectionRecord::default());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let now = Utc::now();
        let mut record = ConnectionRecord::default();
        record.commit_tokens("sekrit", None, now, ConnectionProfile::new("p1", "Ada"), now);
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("sekrit"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn serializes_camel_case() {
        let record = ConnectionRecord::default();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("providerMemberId").is_some());
        assert!(json.get("oauthInitiatedAt").is_some());
    }
}
