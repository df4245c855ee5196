/// Postgres stores
///
/// Schema lives in `migrations/`. Uniqueness comes from the table
/// constraints; a violation surfaces as `StoreError::UniqueViolation`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{CredentialRecord, CredentialStore, RefreshTokenRecord, RefreshTokenRepository};
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let row = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT identifier, secret_hash
            FROM login
            WHERE identifier = $1
            "#,
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(identifier, secret_hash)| CredentialRecord {
            identifier,
            secret_hash,
        }))
    }

    async fn save(&self, record: CredentialRecord) -> Result<CredentialRecord, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO login (identifier, secret_hash)
            VALUES ($1, $2)
            "#,
        )
        .bind(&record.identifier)
        .bind(&record.secret_hash)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete(&self, identifier: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM login WHERE identifier = $1")
            .bind(identifier)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenRepository {
    pool: PgPool,
}

impl PgRefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokenRepository {
    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, (i64, String, String, DateTime<Utc>)>(
            r#"
            SELECT id, token_hash, identifier, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, token_hash, identifier, created_at)| RefreshTokenRecord {
            id,
            token_hash,
            identifier,
            created_at,
        }))
    }

    async fn save(
        &self,
        token_hash: &str,
        identifier: &str,
        created_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO refresh_tokens (token_hash, identifier, created_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(token_hash)
        .bind(identifier)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(RefreshTokenRecord {
            id,
            token_hash: token_hash.to_string(),
            identifier: identifier.to_string(),
            created_at,
        })
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
