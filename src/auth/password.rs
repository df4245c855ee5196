/// Secret Hashing and Verification
///
/// bcrypt with a configurable cost. Both calls are CPU bound; async callers
/// run them on the blocking pool.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Hash a plaintext secret
///
/// # Errors
/// Returns error if bcrypt rejects the cost or fails internally
pub fn hash_password(secret: &str, cost: u32) -> Result<String, AppError> {
    hash(secret, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a secret against its stored hash
///
/// `Ok(false)` on mismatch. A hash that bcrypt cannot parse is an error,
/// not a mismatch.
pub fn verify_password(secret: &str, secret_hash: &str) -> Result<bool, AppError> {
    verify(secret, secret_hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}
