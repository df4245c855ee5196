/// Persistence collaborators
///
/// Credential records and refresh-token records live behind two small
/// async traits. Uniqueness is enforced by the store itself: a duplicate
/// insert fails with `StoreError::UniqueViolation` instead of overwriting.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Identifier plus salted secret hash. Never holds the plaintext secret.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub identifier: String,
    pub secret_hash: String,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("identifier", &self.identifier)
            .field("secret_hash", &"<redacted>")
            .finish()
    }
}

/// A stored refresh token. Only the SHA-256 digest of the token is kept,
/// next to the identifier it was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub token_hash: String,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<CredentialRecord>, StoreError>;

    /// Fails with `UniqueViolation` when the identifier is taken.
    async fn save(&self, record: CredentialRecord) -> Result<CredentialRecord, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, identifier: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Inserts a record with a store-generated id. Fails with
    /// `UniqueViolation` when the hash is already present.
    async fn save(
        &self,
        token_hash: &str,
        identifier: &str,
        created_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StoreError>;

    /// Returns whether a record was removed.
    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, StoreError>;
}
