//! Notifier port: out-of-band delivery of one-time codes.

use crate::domain::{Identifier, OneTimeCode};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Code delivery failed: {0}")]
    Delivery(String),
}

/// Trait for one-time code delivery (email, SMS, console in demos).
///
/// Delivery failures must be reported, never swallowed, so the reset flow
/// does not advance without the user receiving a code.
pub trait CodeNotifier: Send + Sync {
    /// # Errors
    /// Returns [`NotifyError`] if the code could not be handed off.
    fn send_code(&self, recipient: &Identifier, code: &OneTimeCode) -> Result<(), NotifyError>;
}
