/// Credential verification
///
/// `CredentialVerifier` is the seam between the login service and the way
/// secrets are checked. `PasswordVerifier` compares against bcrypt hashes
/// held by a `CredentialStore`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, AuthError};
use crate::store::CredentialStore;

/// The verified identity behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub identifier: String,
    /// Empty means "the deployment's default scope"
    pub authorities: Vec<String>,
}

impl Principal {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            authorities: Vec::new(),
        }
    }
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `AuthError::NotFound` for an unknown identifier,
    /// `AuthError::BadCredentials` for a wrong secret.
    async fn verify(&self, identifier: &str, secret: &str) -> Result<Principal, AppError>;
}

pub struct PasswordVerifier {
    store: Arc<dyn CredentialStore>,
    // Compared against when the identifier is unknown, so both failure
    // paths cost one bcrypt verification.
    dummy_hash: String,
}

impl PasswordVerifier {
    pub fn new(store: Arc<dyn CredentialStore>, hash_cost: u32) -> Result<Self, AppError> {
        let dummy_hash = hash_password("unknown-identifier", hash_cost)?;
        Ok(Self { store, dummy_hash })
    }
}

#[async_trait]
impl CredentialVerifier for PasswordVerifier {
    async fn verify(&self, identifier: &str, secret: &str) -> Result<Principal, AppError> {
        let record = self.store.find_by_identifier(identifier).await?;

        let (secret_hash, known) = match record {
            Some(record) => (record.secret_hash, true),
            None => (self.dummy_hash.clone(), false),
        };

        let secret = secret.to_string();
        let matches =
            tokio::task::spawn_blocking(move || verify_password(&secret, &secret_hash)).await??;

        match (known, matches) {
            (false, _) => Err(AuthError::NotFound.into()),
            (true, false) => Err(AuthError::BadCredentials.into()),
            (true, true) => Ok(Principal::new(identifier)),
        }
    }
}
