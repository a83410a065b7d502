use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdempotencyError;

/// Validated idempotency key, immutable after construction.
///
/// Client-supplied via the `Idempotency-Key` request header, or generated
/// per request when the header is absent (a generated key is unknown to the
/// client, so it deduplicates nothing across requests).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    const MAX_LENGTH: usize = 128;

    /// Creates a key from a client-supplied value, validating it.
    pub fn new(key: impl Into<String>) -> Result<Self, IdempotencyError> {
        let key = key.into().trim().to_string();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    /// Generates a fresh random key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(key: &str) -> Result<(), IdempotencyError> {
        if key.is_empty() {
            return Err(IdempotencyError::InvalidKey("key cannot be empty".into()));
        }
        if key.len() > Self::MAX_LENGTH {
            return Err(IdempotencyError::InvalidKey(format!(
                "key exceeds {} characters",
                Self::MAX_LENGTH
            )));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(IdempotencyError::InvalidKey(
                "key contains invalid characters (allowed: a-z, A-Z, 0-9, -, _)".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_keys() {
        assert!(IdempotencyKey::new("order-retry_01").is_ok());
        assert!(IdempotencyKey::new("  trimmed-key  ").is_ok());
    }

    #[test]
    fn rejects_empty_and_overlong_keys() {
        assert!(IdempotencyKey::new("").is_err());
        assert!(IdempotencyKey::new("   ").is_err());
        assert!(IdempotencyKey::new("x".repeat(129)).is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(IdempotencyKey::new("key with spaces").is_err());
        assert!(IdempotencyKey::new("key/slash").is_err());
    }

    #[test]
    fn generated_keys_are_unique_and_valid() {
        let a = IdempotencyKey::generate();
        let b = IdempotencyKey::generate();
        assert_ne!(a, b);
        assert!(IdempotencyKey::new(a.as_str()).is_ok());
    }
}
