//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings, so the parameters travel with each
//! hash and verification works even after the configured cost changes.
//!
//! # Security
//!
//! - Argon2id (memory-hard)
//! - Random 16-byte salt per hash from the OS RNG
//! - Verification goes through `argon2`'s constant-time comparison

use std::sync::OnceLock;

use argon2::password_hash::{PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::PasswordHash;

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("Invalid Argon2 parameters: {0}")]
    Params(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    fn default() -> Self {
        // OWASP minimum for Argon2id: 19 MiB, t=2, p=1.
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies passwords with a fixed Argon2id configuration.
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    /// Hash of a throwaway password, verified against when an account is
    /// missing so both paths cost the same.
    dummy: OnceLock<Option<PasswordHash>>,
}

impl CredentialHasher {
    /// # Errors
    /// Returns [`HashingError::Params`] if the parameters are out of range.
    pub fn new(params: HashingParams) -> Result<Self, HashingError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| HashingError::Params(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy: OnceLock::new(),
        })
    }

    /// Hash a plaintext password into a PHC string.
    ///
    /// # Errors
    /// Returns [`HashingError::Hash`] if Argon2 fails.
    pub fn hash(&self, password: &str) -> Result<PasswordHash, HashingError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HashingError::Hash(e.to_string()))?;
        Ok(PasswordHash::from_encoded(hash.to_string()))
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// Malformed stored hashes never verify.
    #[must_use]
    pub fn verify(&self, password: &str, stored: &PasswordHash) -> bool {
        let parsed = match argon2::PasswordHash::new(stored.as_str()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Stored password hash is not a valid PHC string: {e}");
                return false;
            }
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn one verification against a throwaway hash.
    pub fn verify_dummy(&self, password: &str) {
        let dummy = self
            .dummy
            .get_or_init(|| self.hash("cardiorisk-unknown-account").ok());
        if let Some(hash) = dummy {
            let _ = self.verify(password, hash);
        }
    }
}
