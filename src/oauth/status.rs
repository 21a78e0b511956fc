//! Connection status classification.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{ConnectionProfile, ConnectionRecord};

/// How a user's provider linkage currently stands.
///
/// `Expired` deliberately omits the profile: the caller must re-authorize,
/// not redisplay stale profile data. There is no refresh-token exchange path
/// for this provider, so expiry is terminal until the user reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "profile", rename_all = "camelCase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected(ConnectionProfile),
    Expired,
}

/// Pure classification of a record at a given instant. No side effects, no
/// silent refresh.
pub fn resolve_status(record: &ConnectionRecord, now: DateTime<Utc>) -> ConnectionStatus {
    let (Some(member_id), Some(_)) = (&record.provider_member_id, &record.access_token) else {
        return ConnectionStatus::Disconnected;
    };
    if record.is_token_expired(now) {
        return ConnectionStatus::Expired;
    }
    let profile = record
        .profile_snapshot
        .clone()
        .unwrap_or_else(|| ConnectionProfile::new(member_id.clone(), member_id.clone()));
    ConnectionStatus::Connected(profile)
}
