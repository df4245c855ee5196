/// Authentication module
///
/// Credential verification, RS256 access tokens, secret hashing
/// and refresh token management.

mod claims;
mod credentials;
mod jwt;
mod keys;
mod password;
mod refresh_token;

pub use claims::Claims;
pub use credentials::{CredentialVerifier, PasswordVerifier, Principal};
pub use jwt::{SignedToken, TokenIssuer, TokenVerifier};
pub use keys::{SigningKeys, SIGNING_ALGORITHM};
pub use password::{hash_password, verify_password};
pub use refresh_token::{RefreshToken, RefreshTokenStore};

#[cfg(test)]
pub(crate) use keys::test_keys;
