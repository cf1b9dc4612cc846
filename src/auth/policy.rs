//! Registration input rules: identifier normalization and secret strength

use crate::types::AuthError;

/// Longest identifier accepted (RFC 5321 path limit)
pub const MAX_IDENTIFIER_LEN: usize = 254;

/// Normalize an identifier for storage and lookup.
///
/// Identifiers are trimmed and lower-cased; empty, oversized, or
/// whitespace/control-bearing identifiers are rejected.
pub fn normalize_identifier(raw: &str) -> Result<String, AuthError> {
    let identifier = raw.trim().to_lowercase();

    if identifier.is_empty() {
        return Err(AuthError::InvalidRequest("identifier is required".into()));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(AuthError::InvalidRequest(format!(
            "identifier must be at most {} bytes",
            MAX_IDENTIFIER_LEN
        )));
    }
    if identifier
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(AuthError::InvalidRequest(
            "identifier must not contain whitespace".into(),
        ));
    }

    Ok(identifier)
}

/// Minimum secret-strength policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPolicy {
    pub min_length: usize,
    pub max_length: usize,
    /// How many of {lowercase, uppercase, digit, symbol} must appear
    pub min_classes: usize,
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 128,
            min_classes: 3,
        }
    }
}

impl SecretPolicy {
    pub fn with_min_length(min_length: usize) -> Self {
        Self {
            min_length,
            ..Self::default()
        }
    }

    /// Check a secret; the error names the first rule it breaks.
    pub fn check(&self, identifier: &str, secret: &str) -> Result<(), AuthError> {
        let length = secret.chars().count();
        if length < self.min_length {
            return Err(AuthError::WeakSecret(format!(
                "must be at least {} characters",
                self.min_length
            )));
        }
        if length > self.max_length {
            return Err(AuthError::WeakSecret(format!(
                "must be at most {} characters",
                self.max_length
            )));
        }

        let classes = [
            secret.chars().any(|c| c.is_lowercase()),
            secret.chars().any(|c| c.is_uppercase()),
            secret.chars().any(|c| c.is_ascii_digit()),
            secret.chars().any(|c| !c.is_alphanumeric()),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        if classes < self.min_classes {
            return Err(AuthError::WeakSecret(format!(
                "must mix at least {} of lowercase, uppercase, digits and symbols",
                self.min_classes
            )));
        }

        if secret.to_lowercase() == identifier.to_lowercase() {
            return Err(AuthError::WeakSecret(
                "must not match the identifier".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  A@X.com ").unwrap(), "a@x.com");
        assert!(normalize_identifier("   ").is_err());
        assert!(normalize_identifier("a b@x.com").is_err());
        assert!(normalize_identifier(&"a".repeat(255)).is_err());
    }

    #[test]
    fn test_strong_secret_accepted() {
        let policy = SecretPolicy::default();
        assert!(policy.check("a@x.com", "S3cur3Pass!").is_ok());
        assert!(policy.check("a@x.com", "correct horse 42").is_ok());
    }

    #[test]
    fn test_weak_secrets_rejected() {
        let policy = SecretPolicy::default();

        let short = policy.check("a@x.com", "Ab1!").unwrap_err();
        assert!(matches!(short, AuthError::WeakSecret(ref m) if m.contains("at least 10")));

        let single_class = policy.check("a@x.com", "alllowercaseletters").unwrap_err();
        assert!(matches!(single_class, AuthError::WeakSecret(ref m) if m.contains("mix")));

        let too_long = policy.check("a@x.com", &"Aa1!".repeat(40)).unwrap_err();
        assert!(matches!(too_long, AuthError::WeakSecret(ref m) if m.contains("at most")));
    }

    #[test]
    fn test_secret_equal_to_identifier_rejected() {
        let policy = SecretPolicy::with_min_length(6);
        let err = policy.check("Ab1@x.com", "ab1@X.COM").unwrap_err();
        assert!(matches!(err, AuthError::WeakSecret(ref m) if m.contains("identifier")));
    }
}
