/// Access token issuance and verification
///
/// Tokens are RS256-signed compact JWTs. The issuer needs the private half
/// of the key pair, the verifier only the public half.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Header, Validation};

use crate::auth::claims::Claims;
use crate::auth::credentials::Principal;
use crate::auth::keys::{SigningKeys, SIGNING_ALGORITHM};
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError, TokenError};

/// A signed access token and the instant it stops being valid
#[derive(Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenIssuer {
    keys: Arc<SigningKeys>,
    issuer: String,
    default_scope: String,
    ttl_seconds: i64,
}

impl TokenIssuer {
    pub fn new(keys: Arc<SigningKeys>, settings: &JwtSettings) -> Result<Self, ConfigError> {
        if !keys.can_sign() {
            return Err(ConfigError::MissingRequired(
                "jwt.private_key_pem or jwt.private_key_path".to_string(),
            ));
        }
        if settings.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.access_token_expiry must be positive, got {}",
                settings.access_token_expiry
            )));
        }

        Ok(Self {
            keys,
            issuer: settings.issuer.clone(),
            default_scope: settings.scope.clone(),
            ttl_seconds: settings.access_token_expiry,
        })
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub fn issue(&self, principal: &Principal) -> Result<SignedToken, AppError> {
        self.issue_at(principal, Utc::now().timestamp())
    }

    /// Sign a token for `principal` issued at `issued_at` (Unix seconds).
    ///
    /// A principal without authorities gets the configured default scope.
    pub fn issue_at(&self, principal: &Principal, issued_at: i64) -> Result<SignedToken, AppError> {
        let scope = if principal.authorities.is_empty() {
            self.default_scope.clone()
        } else {
            principal.authorities.join(" ")
        };

        let claims = Claims::new(
            principal.identifier.clone(),
            scope,
            self.issuer.clone(),
            issued_at,
            self.ttl_seconds,
        );

        let key = self
            .keys
            .encoding_key()
            .ok_or_else(|| AppError::Internal("Signing key unavailable".to_string()))?;

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Internal(format!("Expiry out of range: {}", claims.exp)))?;

        Ok(SignedToken { token, expires_at })
    }
}

/// Verifies access tokens against the public key.
///
/// Holds no mutable state; one instance is shared by every request.
pub struct TokenVerifier {
    keys: Arc<SigningKeys>,
    issuer: String,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(keys: Arc<SigningKeys>, issuer: impl Into<String>) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Validity window and issuer are checked by hand so each failure
        // keeps its own kind, in a fixed order.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            keys,
            issuer: issuer.into(),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Checks, in order: structure, signature, `iat <= now < exp`, issuer.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        check_structure(token)?;

        let claims = decode::<Claims>(token, self.keys.decoding_key(), &self.validation)
            .map(|data| data.claims)
            .map_err(|e| classify(e.kind()))?;

        if !claims.is_active_at(now) {
            return Err(TokenError::Expired);
        }

        if claims.iss != self.issuer {
            return Err(TokenError::UnknownIssuer);
        }

        Ok(claims)
    }
}

/// Three non-empty segments; header and payload are base64url JSON objects.
///
/// Run before signature verification so that a decoding failure reported
/// by `jsonwebtoken` can only come from the signature segment.
fn check_structure(token: &str) -> Result<(), TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(TokenError::Malformed);
    }

    for segment in &segments[..2] {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| TokenError::Malformed)?;
        serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&bytes)
            .map_err(|_| TokenError::Malformed)?;
    }

    Ok(())
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::Base64(_)
        | ErrorKind::Crypto(_) => TokenError::BadSignature,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::test_keys::{foreign_keys, signing_keys};
    use jsonwebtoken::EncodingKey;

    const NOW: i64 = 1_700_000_000;

    fn settings() -> JwtSettings {
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

    fn principal() -> Principal {
        Principal::new("test12345@test.com")
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(signing_keys(), &settings()).expect("Failed to build issuer")
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(signing_keys(), "self")
    }

    #[test]
    fn test_issue_and_verify_token() {
        let signed = issuer().issue_at(&principal(), NOW).expect("Failed to issue token");
        let claims = verifier()
            .verify_at(&signed.token, NOW + 1)
            .expect("Failed to verify token");

        assert_eq!(claims.sub, "test12345@test.com");
        assert_eq!(claims.iss, "self");
        assert_eq!(claims.scope, "ROLE_USER");
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 900);
        assert_eq!(signed.expires_at.timestamp(), NOW + 900);
    }

    #[test]
    fn test_header_uses_rs256() {
        let signed = issuer().issue_at(&principal(), NOW).unwrap();
        let header = jsonwebtoken::decode_header(&signed.token).unwrap();
        assert_eq!(header.alg, SIGNING_ALGORITHM);
    }

    #[test]
    fn test_issue_is_deterministic_for_fixed_time() {
        let issuer = issuer();
        let a = issuer.issue_at(&principal(), NOW).unwrap();
        let b = issuer.issue_at(&principal(), NOW).unwrap();
        let c = issuer.issue_at(&principal(), NOW + 1).unwrap();

        assert_eq!(a.token, b.token);
        assert_ne!(a.token, c.token);
    }

    #[test]
    fn test_authorities_override_default_scope() {
        let principal = Principal {
            identifier: "a@b.c".to_string(),
            authorities: vec!["ROLE_USER".to_string(), "ROLE_ADMIN".to_string()],
        };
        let signed = issuer().issue_at(&principal, NOW).unwrap();
        let claims = verifier().verify_at(&signed.token, NOW).unwrap();

        assert!(claims.has_scope("ROLE_ADMIN"));
        assert!(claims.has_scope("ROLE_USER"));
    }

    #[test]
    fn test_token_valid_until_expiry_instant() {
        let signed = issuer().issue_at(&principal(), NOW).unwrap();
        let verifier = verifier();

        assert!(verifier.verify_at(&signed.token, NOW).is_ok());
        assert!(verifier.verify_at(&signed.token, NOW + 899).is_ok());
        assert_eq!(
            verifier.verify_at(&signed.token, NOW + 900),
            Err(TokenError::Expired)
        );
        assert_eq!(
            verifier.verify_at(&signed.token, NOW + 10_000),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_token_from_the_future_is_rejected() {
        let signed = issuer().issue_at(&principal(), NOW).unwrap();
        assert_eq!(
            verifier().verify_at(&signed.token, NOW - 1),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_any_signature_mutation_is_rejected() {
        let signed = issuer().issue_at(&principal(), NOW).unwrap();
        let verifier = verifier();
        let signature_start = signed.token.rfind('.').unwrap() + 1;
        let bytes = signed.token.as_bytes();

        // The final character may only carry padding bits.
        for position in signature_start..bytes.len() - 1 {
            let mut mutated = bytes.to_vec();
            mutated[position] = if bytes[position] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(mutated).unwrap();

            assert_eq!(
                verifier.verify_at(&mutated, NOW),
                Err(TokenError::BadSignature),
                "mutation at {} was accepted",
                position
            );
        }
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let signed = issuer().issue_at(&principal(), NOW).unwrap();
        let parts: Vec<&str> = signed.token.split('.').collect();

        let forged_claims = Claims::new("admin@test.com", "ROLE_ADMIN", "self", NOW, 900);
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(verifier().verify_at(&forged, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_token_signed_by_foreign_key_is_rejected() {
        let foreign = TokenIssuer::new(foreign_keys(), &settings()).unwrap();
        let signed = foreign.issue_at(&principal(), NOW).unwrap();

        assert_eq!(
            verifier().verify_at(&signed.token, NOW),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_symmetric_algorithm_is_rejected() {
        let claims = Claims::new("a@b.c", "ROLE_USER", "self", NOW, 900);
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();

        assert_eq!(verifier().verify_at(&token, NOW), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_wrong_issuer() {
        let mut other = settings();
        other.issuer = "someone-else".to_string();
        let issuer = TokenIssuer::new(signing_keys(), &other).unwrap();
        let signed = issuer.issue_at(&principal(), NOW).unwrap();

        assert_eq!(
            verifier().verify_at(&signed.token, NOW),
            Err(TokenError::UnknownIssuer)
        );
    }

    #[test]
    fn test_expiry_is_checked_before_issuer() {
        let mut other = settings();
        other.issuer = "someone-else".to_string();
        let issuer = TokenIssuer::new(signing_keys(), &other).unwrap();
        let signed = issuer.issue_at(&principal(), NOW).unwrap();

        assert_eq!(
            verifier().verify_at(&signed.token, NOW + 900),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let verifier = verifier();
        let not_json = URL_SAFE_NO_PAD.encode(b"not json");
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let missing_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"a@b.c"}"#);

        let cases = vec![
            "".to_string(),
            "invalid".to_string(),
            "invalid.token".to_string(),
            "invalid.token.here".to_string(),
            "a.b.c.d".to_string(),
            format!("{}..sig", header),
            format!("{}.{}.", header, missing_claims),
            format!("{}.{}.sig", not_json, missing_claims),
        ];

        for token in cases {
            assert_eq!(
                verifier.verify_at(&token, NOW),
                Err(TokenError::Malformed),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_signed_token_without_required_claims_is_malformed() {
        let keys = signing_keys();
        let payload = serde_json::json!({ "sub": "a@b.c", "iss": "self", "exp": NOW + 900 });
        let token = encode(
            &Header::new(SIGNING_ALGORITHM),
            &payload,
            keys.encoding_key().unwrap(),
        )
        .unwrap();

        assert_eq!(verifier().verify_at(&token, NOW), Err(TokenError::Malformed));
    }

    #[test]
    fn test_issuer_requires_private_key() {
        let verify_only = Arc::new(
            SigningKeys::from_pem(
                None,
                crate::auth::keys::test_keys::PUBLIC_KEY.as_bytes(),
            )
            .unwrap(),
        );

        assert!(matches!(
            TokenIssuer::new(verify_only, &settings()),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_issuer_rejects_non_positive_ttl() {
        let mut bad = settings();
        bad.access_token_expiry = 0;

        assert!(matches!(
            TokenIssuer::new(signing_keys(), &bad),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
