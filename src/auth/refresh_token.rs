/// Refresh Token Management
///
/// Refresh tokens are:
/// - 64 random alphanumeric characters from a CSPRNG (~380 bits)
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Bound to the identifier they were issued to
/// - Deleted on invalidation; a second invalidation is an error
/// - Optionally bounded by a maximum age

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

use crate::error::{AppError, AuthError, StoreError};
use crate::store::{RefreshTokenRecord, RefreshTokenRepository};

const TOKEN_LENGTH: usize = 64;

/// A freshly generated refresh token. `token` is the only plaintext copy.
#[derive(Clone)]
pub struct RefreshToken {
    pub id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshToken")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

pub struct RefreshTokenStore {
    repository: Arc<dyn RefreshTokenRepository>,
    max_age: Option<Duration>,
}

impl RefreshTokenStore {
    /// `max_age: None` keeps tokens valid until invalidated.
    pub fn new(repository: Arc<dyn RefreshTokenRepository>, max_age: Option<Duration>) -> Self {
        Self {
            repository,
            max_age,
        }
    }

    /// Create and persist a new token for `identifier` in a single insert.
    ///
    /// A uniqueness rejection is not retried.
    pub async fn generate(&self, identifier: &str) -> Result<RefreshToken, AppError> {
        let token = generate_token_value();
        let created_at = Utc::now();

        let record = self
            .repository
            .save(&hash_token(&token), identifier, created_at)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => {
                    AppError::Internal("Refresh token collision".to_string())
                }
                other => AppError::Store(other),
            })?;

        tracing::debug!(refresh_token_id = record.id, "Refresh token issued");

        Ok(RefreshToken {
            id: record.id,
            token,
            created_at: record.created_at,
        })
    }

    pub async fn validate(&self, token: &str) -> Result<RefreshTokenRecord, AppError> {
        let record = self
            .repository
            .find_by_token_hash(&hash_token(token))
            .await?
            .ok_or_else(|| {
                tracing::warn!("Refresh token not found");
                AuthError::InvalidRefreshToken
            })?;

        if let Some(max_age) = self.max_age {
            if Utc::now() - record.created_at >= max_age {
                tracing::info!(refresh_token_id = record.id, "Refresh token expired");
                return Err(AuthError::InvalidRefreshToken.into());
            }
        }

        Ok(record)
    }

    /// Validate, then delete.
    ///
    /// Fails with `InvalidRefreshToken` if the record is absent at either
    /// step, so a repeated invalidation is reported.
    pub async fn invalidate(&self, token: &str) -> Result<(), AppError> {
        let record = self.validate(token).await?;

        if !self.repository.delete_by_token_hash(&record.token_hash).await? {
            tracing::warn!(refresh_token_id = record.id, "Refresh token vanished before delete");
            return Err(AuthError::InvalidRefreshToken.into());
        }

        tracing::info!(refresh_token_id = record.id, "Refresh token invalidated");
        Ok(())
    }
}

fn generate_token_value() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
