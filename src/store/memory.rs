//! In-memory record store for tests and single-process embedding.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{ConnectionRecord, RecordStore};
use crate::error::{ConnectError, Result};

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<String, ConnectionRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the all-null record that comes into existence with a user row.
    pub fn insert_user(&self, user_id: impl Into<String>) {
        let mut records = self.records.write().unwrap();
        records.entry(user_id.into()).or_default();
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, user_id: &str) -> Result<Option<ConnectionRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, record: &ConnectionRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        match records.get_mut(user_id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(ConnectError::UserNotFound(user_id.to_string())),
        }
    }

    async fn update_if_state(
        &self,
        user_id: &str,
        expected_state: &str,
        record: &ConnectionRecord,
    ) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        match records.get_mut(user_id) {
            Some(slot) if slot.oauth_state.as_deref() == Some(expected_state) => {
                *slot = record.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ConnectError::UserNotFound(user_id.to_string())),
        }
    }
}
