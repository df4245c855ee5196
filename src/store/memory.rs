/// In-memory stores
///
/// Used when no database is configured and throughout the tests. Each
/// operation takes the lock once and never across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{CredentialRecord, CredentialStore, RefreshTokenRecord, RefreshTokenRepository};
use crate::error::StoreError;

#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.records.read().get(identifier).cloned())
    }

    async fn save(&self, record: CredentialRecord) -> Result<CredentialRecord, StoreError> {
        let mut records = self.records.write();
        if records.contains_key(&record.identifier) {
            return Err(StoreError::UniqueViolation(format!(
                "login.identifier = {}",
                record.identifier
            )));
        }
        records.insert(record.identifier.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, identifier: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().remove(identifier).is_some())
    }
}

pub struct InMemoryRefreshTokenRepository {
    records: RwLock<HashMap<String, RefreshTokenRecord>>,
    next_id: AtomicI64,
}

impl Default for InMemoryRefreshTokenRepository {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryRefreshTokenRepository {
    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.records.read().get(token_hash).cloned())
    }

    async fn save(
        &self,
        token_hash: &str,
        identifier: &str,
        created_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let mut records = self.records.write();
        if records.contains_key(token_hash) {
            return Err(StoreError::UniqueViolation(
                "refresh_tokens.token_hash".to_string(),
            ));
        }
        let record = RefreshTokenRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token_hash: token_hash.to_string(),
            identifier: identifier.to_string(),
            created_at,
        };
        records.insert(token_hash.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().remove(token_hash).is_some())
    }
}
