/// Access token claims
///
/// Exactly the claim set the login service signs: issuer, issued-at,
/// expiry, subject and a space-separated scope string (RFC 7519 / RFC 8693
/// `scope` convention).

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
    /// Subject, the credential identifier
    pub sub: String,
    /// Space-separated granted scopes
    pub scope: String,
}

impl Claims {
    /// Claims for `subject` valid from `issued_at` for `ttl_seconds`
    pub fn new(
        subject: impl Into<String>,
        scope: impl Into<String>,
        issuer: impl Into<String>,
        issued_at: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            iss: issuer.into(),
            iat: issued_at,
            exp: issued_at + ttl_seconds,
            sub: subject.into(),
            scope: scope.into(),
        }
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|granted| granted == scope)
    }

    /// `iat <= now < exp`
    pub fn is_active_at(&self, now: i64) -> bool {
        self.iat <= now && now < self.exp
    }
}
