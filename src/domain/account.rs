//! User account types.

use std::fmt;

use serde::Serialize;

const MAX_IDENTIFIER_LEN: usize = 254;

/// Normalized account identifier (email or username).
///
/// Trimmed and ASCII-lowercased so lookups are case-insensitive on every
/// backend. `Debug` does not print the value; use `Display` for deliberate
/// output.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Identifier(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier longer than {MAX_IDENTIFIER_LEN} bytes")]
    TooLong,

    #[error("identifier contains whitespace or control characters")]
    InvalidCharacters,
}

impl Identifier {
    /// Parse and normalize user input.
    ///
    /// # Errors
    /// Returns [`IdentifierError`] for empty, oversized or non-printable input.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if trimmed.len() > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong);
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdentifierError::InvalidCharacters);
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Identifier([REDACTED])")
    }
}

/// Encoded password hash (Argon2id PHC string).
///
/// `Debug` does not print the hash.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap an already-encoded hash read from a store.
    #[must_use]
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

/// Persisted account record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub identifier: Identifier,
    pub password_hash: PasswordHash,
}

impl UserAccount {
    #[must_use]
    pub fn new(identifier: Identifier, password_hash: PasswordHash) -> Self {
        Self {
            identifier,
            password_hash,
        }
    }
}

/// Proof of a successful login, handed back to the caller as session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub identifier: Identifier,
    pub authenticated_at: chrono::DateTime<chrono::Utc>,
}
