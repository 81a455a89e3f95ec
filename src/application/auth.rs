//! Auth service: registration, login and password verification.
//!
//! # Security
//!
//! - Login failures are indistinguishable: unknown account, malformed
//!   identifier and wrong password all yield [`AuthError::AuthenticationFailed`]
//! - Unknown accounts still pay for one Argon2 verification
//! - Only hashes reach the credential store

use std::sync::Arc;

use crate::domain::{
    AuthenticatedUser, CredentialHasher, HashingError, Identifier, IdentifierError,
};
use crate::ports::{CredentialStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("An account with this identifier already exists")]
    DuplicateIdentifier,

    #[error("Invalid credentials")]
    AuthenticationFailed,

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Hashing(#[from] HashingError),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists => Self::DuplicateIdentifier,
            other => Self::Store(other),
        }
    }
}

/// Minimum length policy, counted in characters.
pub(crate) fn check_password_policy(password: &str, min: usize) -> Result<(), usize> {
    if password.chars().count() < min {
        return Err(min);
    }
    Ok(())
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<CredentialHasher>,
    min_password_len: usize,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<CredentialHasher>,
        min_password_len: usize,
    ) -> Self {
        Self {
            store,
            hasher,
            min_password_len,
        }
    }

    /// Create an account.
    ///
    /// Checks run in order: confirmation, length policy, existing account.
    ///
    /// # Errors
    /// Returns [`AuthError`] describing the first failed check.
    pub fn register(
        &self,
        identifier: &str,
        password: &str,
        confirmation: &str,
    ) -> Result<Identifier, AuthError> {
        let identifier = Identifier::parse(identifier)?;

        if password != confirmation {
            return Err(AuthError::PasswordMismatch);
        }
        check_password_policy(password, self.min_password_len)
            .map_err(|min| AuthError::WeakPassword { min })?;

        if self.store.find_user(&identifier)?.is_some() {
            return Err(AuthError::DuplicateIdentifier);
        }

        let hash = self.hasher.hash(password)?;
        // The store's own uniqueness guard covers a concurrent registration.
        self.store.create_user(&identifier, &hash)?;

        tracing::info!("Registered new account");
        Ok(identifier)
    }

    /// Authenticate and return the session principal.
    ///
    /// # Errors
    /// Returns [`AuthError::AuthenticationFailed`] for any credential
    /// problem, or [`AuthError::Store`] if the backend is unreachable.
    pub fn login(&self, identifier: &str, password: &str) -> Result<AuthenticatedUser, AuthError> {
        if !self.verify(identifier, password)? {
            tracing::info!("Login rejected");
            return Err(AuthError::AuthenticationFailed);
        }

        let identifier = Identifier::parse(identifier)?;
        tracing::info!("Login succeeded");
        Ok(AuthenticatedUser {
            identifier,
            authenticated_at: chrono::Utc::now(),
        })
    }

    /// Check a password against the stored hash.
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] if the backend is unreachable.
    pub fn verify(&self, identifier: &str, password: &str) -> Result<bool, AuthError> {
        let Ok(identifier) = Identifier::parse(identifier) else {
            self.hasher.verify_dummy(password);
            return Ok(false);
        };

        match self.store.find_user(&identifier)? {
            Some(account) => Ok(self.hasher.verify(password, &account.password_hash)),
            None => {
                self.hasher.verify_dummy(password);
                Ok(false)
            }
        }
    }
}
