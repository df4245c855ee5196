/// Input validators for credential payloads
///
/// Applied to registration payloads before they reach the login service.
/// Login attempts are not validated here: a malformed identifier simply
/// fails verification with the same generic response as any other.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_IDENTIFIER_LENGTH: usize = 254; // RFC 5321
const MIN_SECRET_LENGTH: usize = 8;
const MAX_SECRET_LENGTH: usize = 20;

lazy_static! {
    static ref IDENTIFIER_REGEX: Regex = Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+$").unwrap();
}

/// Validates a credential identifier (an email address)
pub fn is_valid_identifier(identifier: &str) -> Result<String, ValidationError> {
    let trimmed = identifier.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("identifier".to_string()));
    }

    if trimmed.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(
            "identifier".to_string(),
            MAX_IDENTIFIER_LENGTH,
        ));
    }

    if !IDENTIFIER_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("identifier".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a plaintext secret before it is hashed
///
/// Length is counted in characters. Secrets are never trimmed.
pub fn is_valid_secret(secret: &str) -> Result<(), ValidationError> {
    if secret.is_empty() {
        return Err(ValidationError::EmptyField("secret".to_string()));
    }

    let length = secret.chars().count();

    if length < MIN_SECRET_LENGTH {
        return Err(ValidationError::TooShort("secret".to_string(), MIN_SECRET_LENGTH));
    }

    if length > MAX_SECRET_LENGTH {
        return Err(ValidationError::TooLong("secret".to_string(), MAX_SECRET_LENGTH));
    }

    Ok(())
}
