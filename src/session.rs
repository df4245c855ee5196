/// Login service orchestration
///
/// Composes the credential verifier, the token issuer and the refresh
/// token store. Each login attempt moves through
/// `Received -> Verifying -> Issuing -> Responded` or ends in `Rejected`;
/// the state is logged as `login_state`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    hash_password, CredentialVerifier, Principal, RefreshTokenStore, TokenIssuer,
};
use crate::configuration::SeedCredential;
use crate::error::{AppError, AuthError, ErrorContext, StoreError};
use crate::store::{CredentialRecord, CredentialStore};

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Received,
    Verifying,
    Issuing,
    Responded,
    Rejected,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            LoginState::Received => "received",
            LoginState::Verifying => "verifying",
            LoginState::Issuing => "issuing",
            LoginState::Responded => "responded",
            LoginState::Rejected => "rejected",
        };
        f.write_str(state)
    }
}

pub struct LoginService {
    verifier: Arc<dyn CredentialVerifier>,
    credentials: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    refresh_tokens: RefreshTokenStore,
    hash_cost: u32,
}

impl LoginService {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        credentials: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        refresh_tokens: RefreshTokenStore,
        hash_cost: u32,
    ) -> Self {
        Self {
            verifier,
            credentials,
            issuer,
            refresh_tokens,
            hash_cost,
        }
    }

    /// Verify credentials and issue an access token, plus a refresh token
    /// when `want_refresh` is set.
    ///
    /// Unknown identifier and wrong secret both come back as
    /// `AuthError::Unauthorized`. Any other failure is a generic internal
    /// error.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        want_refresh: bool,
    ) -> Result<LoginResponse, AppError> {
        let identifier = identifier.trim();
        let ctx = ErrorContext::new("login").with_identifier(identifier);
        let log_state = |state: LoginState| {
            tracing::info!(
                request_id = %ctx.request_id,
                identifier = identifier,
                login_state = %state,
                "Login attempt"
            );
        };

        log_state(LoginState::Received);
        log_state(LoginState::Verifying);

        let principal = match self.verifier.verify(identifier, secret).await {
            Ok(principal) => principal,
            Err(e) => {
                ctx.log_error(&e);
                log_state(LoginState::Rejected);
                return Err(collapse(e));
            }
        };

        log_state(LoginState::Issuing);

        match self.issue(&principal, want_refresh).await {
            Ok(response) => {
                log_state(LoginState::Responded);
                Ok(response)
            }
            Err(e) => {
                ctx.log_error(&e);
                log_state(LoginState::Rejected);
                Err(collapse(e))
            }
        }
    }

    async fn issue(
        &self,
        principal: &Principal,
        want_refresh: bool,
    ) -> Result<LoginResponse, AppError> {
        let signed = self.issuer.issue(principal)?;
        let refresh_token = if want_refresh {
            Some(self.refresh_tokens.generate(&principal.identifier).await?.token)
        } else {
            None
        };

        Ok(LoginResponse {
            access_token: signed.token,
            expires_at: signed.expires_at,
            refresh_token,
        })
    }

    /// Persist a new credential record.
    ///
    /// `AlreadyExists` when the identifier is taken, whether seen by the
    /// lookup or by the store's uniqueness constraint on a racing insert.
    pub async fn register(&self, identifier: &str, secret_hash: &str) -> Result<(), AppError> {
        let identifier = identifier.trim();
        if self.credentials.find_by_identifier(identifier).await?.is_some() {
            return Err(AuthError::AlreadyExists(identifier.to_string()).into());
        }

        let record = CredentialRecord {
            identifier: identifier.to_string(),
            secret_hash: secret_hash.to_string(),
        };

        match self.credentials.save(record).await {
            Ok(_) => {
                tracing::info!(identifier = identifier, "Credential registered");
                Ok(())
            }
            Err(StoreError::UniqueViolation(_)) => {
                Err(AuthError::AlreadyExists(identifier.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// bcrypt on the blocking pool with the configured cost
    pub async fn hash_secret(&self, secret: &str) -> Result<String, AppError> {
        let secret = secret.to_string();
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || hash_password(&secret, cost)).await?
    }

    /// Exchange a live refresh token for a new access token.
    ///
    /// `identifier` must be the one the refresh token was issued to. The
    /// refresh token is returned unchanged.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        identifier: &str,
    ) -> Result<LoginResponse, AppError> {
        let identifier = identifier.trim();
        let record = self.refresh_tokens.validate(refresh_token).await?;
        if record.identifier != identifier {
            tracing::warn!(
                refresh_token_id = record.id,
                identifier = identifier,
                "Refresh token presented for another identifier"
            );
            return Err(AuthError::InvalidRefreshToken.into());
        }

        if self.credentials.find_by_identifier(identifier).await?.is_none() {
            tracing::warn!(identifier = identifier, "Refresh for unknown identifier");
            return Err(AuthError::InvalidRefreshToken.into());
        }

        let signed = self.issuer.issue(&Principal::new(identifier))?;
        tracing::info!(identifier = identifier, "Access token refreshed");

        Ok(LoginResponse {
            access_token: signed.token,
            expires_at: signed.expires_at,
            refresh_token: Some(refresh_token.to_string()),
        })
    }

    /// Invalidate a refresh token held by `subject`.
    pub async fn logout(&self, refresh_token: &str, subject: &str) -> Result<(), AppError> {
        let record = self.refresh_tokens.validate(refresh_token).await?;
        if record.identifier != subject {
            tracing::warn!(
                refresh_token_id = record.id,
                subject = subject,
                "Logout with a refresh token of another identifier"
            );
            return Err(AuthError::InvalidRefreshToken.into());
        }
        self.refresh_tokens.invalidate(refresh_token).await
    }

    /// Register each seed credential that is not present yet.
    pub async fn seed(&self, seeds: &[SeedCredential]) -> Result<(), AppError> {
        for seed in seeds {
            let secret_hash = self.hash_secret(&seed.secret).await?;
            match self.register(&seed.identifier, &secret_hash).await {
                Ok(()) => tracing::info!(identifier = %seed.identifier, "Seed credential created"),
                Err(AppError::Auth(AuthError::AlreadyExists(_))) => {
                    tracing::info!(identifier = %seed.identifier, "Seed credential already present")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn collapse(err: AppError) -> AppError {
    match err {
        AppError::Auth(AuthError::NotFound | AuthError::BadCredentials | AuthError::Unauthorized) => {
            AuthError::Unauthorized.into()
        }
        _ => AppError::Internal("Login failed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_keys::signing_keys;
    use crate::auth::{PasswordVerifier, TokenVerifier};
    use crate::configuration::JwtSettings;
    use crate::store::memory::{InMemoryCredentialStore, InMemoryRefreshTokenRepository};
    use async_trait::async_trait;

    const COST: u32 = 4;

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            private_key_pem: None,
            private_key_path: None,
            public_key_pem: None,
            public_key_path: None,
            access_token_expiry: 900,
            refresh_token_expiry: None,
            issuer: "self".to_string(),
            scope: "ROLE_USER".to_string(),
        }
    }

    struct Fixture {
        service: LoginService,
        credentials: Arc<InMemoryCredentialStore>,
        verifier: TokenVerifier,
    }

    fn fixture() -> Fixture {
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let verifier = Arc::new(PasswordVerifier::new(credentials.clone(), COST).unwrap());
        let service = build(verifier, credentials.clone());
        Fixture {
            service,
            credentials,
            verifier: TokenVerifier::new(signing_keys(), "self"),
        }
    }

    fn build(
        verifier: Arc<dyn CredentialVerifier>,
        credentials: Arc<InMemoryCredentialStore>,
    ) -> LoginService {
        LoginService::new(
            verifier,
            credentials,
            TokenIssuer::new(signing_keys(), &jwt_settings()).unwrap(),
            RefreshTokenStore::new(Arc::new(InMemoryRefreshTokenRepository::new()), None),
            COST,
        )
    }

    async fn register(service: &LoginService, identifier: &str, secret: &str) {
        let hash = service.hash_secret(secret).await.unwrap();
        service.register(identifier, &hash).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_then_login_issues_verifiable_token() {
        let f = fixture();
        register(&f.service, "test12345@test.com", "test1234").await;

        let response = f
            .service
            .login("test12345@test.com", "test1234", false)
            .await
            .expect("Login should succeed");

        assert!(!response.access_token.is_empty());
        assert!(response.expires_at > Utc::now());
        assert!(response.refresh_token.is_none());

        let claims = f.verifier.verify(&response.access_token).unwrap();
        assert_eq!(claims.sub, "test12345@test.com");
        assert_eq!(claims.exp, response.expires_at.timestamp());
        assert!(f.verifier.verify_at(&response.access_token, claims.exp).is_err());
    }

    #[tokio::test]
    async fn test_credential_failures_are_indistinguishable() {
        let f = fixture();
        register(&f.service, "test12345@test.com", "test1234").await;

        let unknown = f
            .service
            .login("nobody@test.com", "test1234", false)
            .await
            .err()
            .unwrap();
        let wrong = f
            .service
            .login("test12345@test.com", "wrong-secret", false)
            .await
            .err()
            .unwrap();

        assert!(matches!(unknown, AppError::Auth(AuthError::Unauthorized)));
        assert!(matches!(wrong, AppError::Auth(AuthError::Unauthorized)));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_duplicate_register_is_rejected() {
        let f = fixture();
        register(&f.service, "a@b.c", "secret123").await;

        let err = f.service.register("a@b.c", "other-hash").await.unwrap_err();

        assert!(matches!(err, AppError::Auth(AuthError::AlreadyExists(ref id)) if id == "a@b.c"));
        assert_eq!(f.credentials.len(), 1);
        let stored = f.credentials.find_by_identifier("a@b.c").await.unwrap().unwrap();
        assert_ne!(stored.secret_hash, "other-hash");
    }

    #[tokio::test]
    async fn test_stored_hash_is_not_the_secret() {
        let f = fixture();
        register(&f.service, "a@b.c", "secret123").await;

        let stored = f.credentials.find_by_identifier("a@b.c").await.unwrap().unwrap();
        assert!(!stored.secret_hash.contains("secret123"));
    }

    #[tokio::test]
    async fn test_refresh_flow() {
        let f = fixture();
        register(&f.service, "a@b.c", "secret123").await;

        let login = f.service.login("a@b.c", "secret123", true).await.unwrap();
        let refresh_token = login.refresh_token.expect("Refresh token requested");

        let refreshed = f.service.refresh(&refresh_token, "a@b.c").await.unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some(refresh_token.as_str()));
        assert_eq!(f.verifier.verify(&refreshed.access_token).unwrap().sub, "a@b.c");

        f.service.logout(&refresh_token, "a@b.c").await.unwrap();

        let err = f.service.refresh(&refresh_token, "a@b.c").await.err().unwrap();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidRefreshToken)));
        let err = f.service.logout(&refresh_token, "a@b.c").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_for_unknown_identifier_is_rejected() {
        let f = fixture();
        register(&f.service, "a@b.c", "secret123").await;
        let login = f.service.login("a@b.c", "secret123", true).await.unwrap();

        let err = f
            .service
            .refresh(&login.refresh_token.unwrap(), "ghost@b.c")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_token_cannot_mint_for_another_identifier() {
        let f = fixture();
        register(&f.service, "victim@test.com", "secret123").await;
        register(&f.service, "mallory@test.com", "secret456").await;
        let login = f.service.login("mallory@test.com", "secret456", true).await.unwrap();
        let refresh_token = login.refresh_token.unwrap();

        let err = f
            .service
            .refresh(&refresh_token, "victim@test.com")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidRefreshToken)));

        // Still usable by its owner
        let own = f.service.refresh(&refresh_token, "mallory@test.com").await.unwrap();
        assert_eq!(f.verifier.verify(&own.access_token).unwrap().sub, "mallory@test.com");
    }

    #[tokio::test]
    async fn test_logout_of_another_identifiers_token_is_rejected() {
        let f = fixture();
        register(&f.service, "a@b.c", "secret123").await;
        let login = f.service.login("a@b.c", "secret123", true).await.unwrap();
        let refresh_token = login.refresh_token.unwrap();

        let err = f.service.logout(&refresh_token, "x@y.z").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidRefreshToken)));
        assert!(f.service.refresh(&refresh_token, "a@b.c").await.is_ok());
    }

    #[tokio::test]
    async fn test_identifier_is_trimmed_consistently() {
        let f = fixture();
        register(&f.service, " a@b.c ", "secret123").await;

        let login = f.service.login(" a@b.c ", "secret123", true).await.unwrap();
        assert_eq!(f.verifier.verify(&login.access_token).unwrap().sub, "a@b.c");
        assert!(f.credentials.find_by_identifier("a@b.c").await.unwrap().is_some());

        let refreshed = f
            .service
            .refresh(&login.refresh_token.unwrap(), "a@b.c  ")
            .await
            .unwrap();
        assert_eq!(f.verifier.verify(&refreshed.access_token).unwrap().sub, "a@b.c");
    }

    #[tokio::test]
    async fn test_seed_skips_existing_identifiers() {
        let f = fixture();
        let seeds = vec![SeedCredential {
            identifier: "test12345@test.com".to_string(),
            secret: "test1234".to_string(),
        }];

        f.service.seed(&seeds).await.unwrap();
        f.service.seed(&seeds).await.unwrap();

        assert_eq!(f.credentials.len(), 1);
        assert!(f.service.login("test12345@test.com", "test1234", false).await.is_ok());
    }

    struct BrokenVerifier;

    #[async_trait]
    impl CredentialVerifier for BrokenVerifier {
        async fn verify(&self, _identifier: &str, _secret: &str) -> Result<Principal, AppError> {
            Err(StoreError::Unavailable("connection refused".to_string()).into())
        }
    }

    #[tokio::test]
    async fn test_unexpected_failure_is_generic() {
        let service = build(Arc::new(BrokenVerifier), Arc::new(InMemoryCredentialStore::new()));

        let err = service.login("a@b.c", "secret123", false).await.err().unwrap();

        assert!(matches!(err, AppError::Internal(_)));
        assert!(!err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_response_uses_camel_case() {
        let response = LoginResponse {
            access_token: "t".to_string(),
            expires_at: Utc::now(),
            refresh_token: None,
        };
        let json = serde_json::to_value(&response).unwrap();

        assert!(json.get("accessToken").is_some());
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("refreshToken").is_none());
    }
}
