//! Keyed record store for per-user connection records.
//!
//! The datastore itself is owned by the surrounding application; this crate
//! only sees a narrow keyed interface scoped to one user at a time.

pub mod memory;
pub mod record;

pub use memory::MemoryRecordStore;
pub use record::{ConnectionProfile, ConnectionRecord};

use async_trait::async_trait;

use crate::error::Result;

/// Abstract interface over the per-user connection records.
///
/// `update_if_state` is the mutual-exclusion point for the single-use CSRF
/// state: the write that commits tokens (or clears a failed attempt) only
/// applies while the stored `oauth_state` still equals the expected value, so
/// one authorization code can never be spent twice.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a user's record. `None` means the user row does not exist.
    async fn get(&self, user_id: &str) -> Result<Option<ConnectionRecord>>;

    /// Overwrite a user's record.
    async fn put(&self, user_id: &str, record: &ConnectionRecord) -> Result<()>;

    /// Overwrite a user's record only if its current `oauth_state` equals
    /// `expected_state`. Returns whether the write was applied.
    async fn update_if_state(
        &self,
        user_id: &str,
        expected_state: &str,
        record: &ConnectionRecord,
    ) -> Result<bool>;
}
