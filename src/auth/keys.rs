/// Signing key pair
///
/// Loaded once at startup and shared read-only (`Arc<SigningKeys>`) by the
/// issuer and the verifier. A key that does not parse, or a private half
/// that does not match the public half, is a startup error.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::configuration::JwtSettings;
use crate::error::ConfigError;

pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

pub struct SigningKeys {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
}

impl SigningKeys {
    /// Build from PEM data. `private_pem` is optional for verify-only
    /// processes such as the gateway.
    pub fn from_pem(private_pem: Option<&[u8]>, public_pem: &[u8]) -> Result<Self, ConfigError> {
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| ConfigError::InvalidKey(format!("public key: {}", e)))?;

        let encoding = private_pem
            .map(|pem| {
                EncodingKey::from_rsa_pem(pem)
                    .map_err(|e| ConfigError::InvalidKey(format!("private key: {}", e)))
            })
            .transpose()?;

        let keys = Self { encoding, decoding };
        if keys.can_sign() {
            keys.check_pair()?;
        }
        Ok(keys)
    }

    pub fn from_settings(settings: &JwtSettings) -> Result<Self, ConfigError> {
        let public = load_pem(
            "public",
            settings.public_key_pem.as_deref(),
            settings.public_key_path.as_deref(),
        )?
        .ok_or_else(|| {
            ConfigError::MissingRequired("jwt.public_key_pem or jwt.public_key_path".to_string())
        })?;

        let private = load_pem(
            "private",
            settings.private_key_pem.as_deref(),
            settings.private_key_path.as_deref(),
        )?;

        Self::from_pem(private.as_deref().map(str::as_bytes), public.as_bytes())
    }

    pub fn can_sign(&self) -> bool {
        self.encoding.is_some()
    }

    pub(crate) fn encoding_key(&self) -> Option<&EncodingKey> {
        self.encoding.as_ref()
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Sign a throwaway payload and verify it with the public half.
    fn check_pair(&self) -> Result<(), ConfigError> {
        let encoding = self
            .encoding
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("private key".to_string()))?;

        let probe = serde_json::json!({ "sub": "key-pair-probe" });
        let token = encode(&Header::new(SIGNING_ALGORITHM), &probe, encoding)
            .map_err(|e| ConfigError::InvalidKey(format!("private key cannot sign: {}", e)))?;

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<serde_json::Value>(&token, &self.decoding, &validation)
            .map(|_| ())
            .map_err(|_| {
                ConfigError::InvalidKey("private key does not match public key".to_string())
            })
    }
}

fn load_pem(
    name: &str,
    inline: Option<&str>,
    path: Option<&str>,
) -> Result<Option<String>, ConfigError> {
    match (inline, path) {
        (Some(pem), _) if !pem.trim().is_empty() => Ok(Some(pem.to_string())),
        (_, Some(path)) => std::fs::read_to_string(path).map(Some).map_err(|e| {
            ConfigError::InvalidValue(format!("cannot read {} key from {}: {}", name, path, e))
        }),
        _ => Ok(None),
    }
}
