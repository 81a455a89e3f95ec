//! Credential store port: minimal account persistence.
//!
//! Implemented by the SQLite table adapter and the spreadsheet adapter.
//! The store only ever sees password hashes.

use crate::domain::{Identifier, PasswordHash, UserAccount};

/// Error type shared by all credential store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Account already exists")]
    AlreadyExists,

    #[error("Account not found")]
    NotFound,

    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed credential record: {0}")]
    Malformed(String),
}

/// Trait for credential persistence.
///
/// `create_user` must map a backend-level uniqueness violation to
/// [`StoreError::AlreadyExists`]; callers pre-check with `find_user` but
/// that check is not atomic with the insert.
pub trait CredentialStore: Send + Sync {
    /// Look up an account.
    ///
    /// # Returns
    /// `None` if no account has this identifier.
    ///
    /// # Errors
    /// Returns error if the backend cannot be reached or the row is invalid.
    fn find_user(&self, identifier: &Identifier) -> Result<Option<UserAccount>, StoreError>;

    /// Insert a new account.
    ///
    /// # Errors
    /// Returns [`StoreError::AlreadyExists`] on duplicate identifiers.
    fn create_user(
        &self,
        identifier: &Identifier,
        password_hash: &PasswordHash,
    ) -> Result<(), StoreError>;

    /// Replace the stored hash of an existing account.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the account does not exist.
    fn update_password(
        &self,
        identifier: &Identifier,
        new_hash: &PasswordHash,
    ) -> Result<(), StoreError>;

    /// List every registered identifier.
    ///
    /// # Errors
    /// Returns error if the backend cannot be reached.
    fn list_identifiers(&self) -> Result<Vec<Identifier>, StoreError>;
}
