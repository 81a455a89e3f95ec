//! Password reset flow: `AwaitingEmail -> CodeIssued -> Completed`.
//!
//! The flow state is owned by the caller (one per session) and passed into
//! every call; the service itself holds no per-user state.
//!
//! # Security
//!
//! - Codes are 6 digits from a CSPRNG, compared in constant time
//! - Codes expire after `reset.code_ttl_secs`
//! - After `reset.max_attempts` wrong codes the code is discarded
//! - Unknown identifiers get the same acknowledgement as known ones, but
//!   no code is generated or dispatched

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::application::auth::check_password_policy;
use crate::config::ResetSettings;
use crate::domain::{CredentialHasher, HashingError, Identifier, IdentifierError, OneTimeCode};
use crate::ports::{CodeNotifier, CredentialStore, NotifyError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    #[error("No password reset in progress")]
    NoPendingReset,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Invalid code ({remaining} attempts left)")]
    CodeMismatch { remaining: u32 },

    #[error("Code expired, request a new one")]
    CodeExpired,

    #[error("Too many invalid codes, request a new one")]
    AttemptsExhausted,

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("Could not deliver the reset code: {0}")]
    Notification(#[from] NotifyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hashing(#[from] HashingError),
}

/// A code that has been issued and not yet redeemed.
///
/// `account` and `code` are `None` when the identifier has no account;
/// such a pending reset can never complete.
#[derive(Debug)]
pub struct PendingReset {
    account: Option<Identifier>,
    code: Option<OneTimeCode>,
    issued_at: DateTime<Utc>,
    attempts: u32,
}

#[derive(Debug, Default)]
pub enum ResetState {
    #[default]
    AwaitingEmail,
    CodeIssued(PendingReset),
    Completed,
}

impl ResetState {
    #[must_use]
    pub fn is_code_issued(&self) -> bool {
        matches!(self, Self::CodeIssued(_))
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

pub struct PasswordResetService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn CodeNotifier>,
    hasher: Arc<CredentialHasher>,
    settings: ResetSettings,
    min_password_len: usize,
}

impl PasswordResetService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn CodeNotifier>,
        hasher: Arc<CredentialHasher>,
        settings: ResetSettings,
        min_password_len: usize,
    ) -> Self {
        Self {
            store,
            notifier,
            hasher,
            settings,
            min_password_len,
        }
    }

    /// Start (or restart) a reset for `identifier`.
    ///
    /// Any previous pending code is discarded. On success the state is
    /// `CodeIssued` whether or not the account exists.
    ///
    /// # Errors
    /// On error the state is left at `AwaitingEmail`.
    pub fn begin(&self, state: &mut ResetState, identifier: &str) -> Result<(), ResetError> {
        self.begin_at(state, identifier, Utc::now())
    }

    /// [`begin`](Self::begin) with an explicit clock.
    ///
    /// # Errors
    /// See [`begin`](Self::begin).
    pub fn begin_at(
        &self,
        state: &mut ResetState,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ResetError> {
        *state = ResetState::AwaitingEmail;
        let identifier = Identifier::parse(identifier)?;

        let pending = match self.store.find_user(&identifier)? {
            Some(account) => {
                let code = OneTimeCode::generate();
                self.notifier.send_code(&account.identifier, &code)?;
                tracing::info!("Reset code issued");
                PendingReset {
                    account: Some(account.identifier),
                    code: Some(code),
                    issued_at: now,
                    attempts: 0,
                }
            }
            None => {
                tracing::debug!("Reset requested for unknown account; nothing dispatched");
                PendingReset {
                    account: None,
                    code: None,
                    issued_at: now,
                    attempts: 0,
                }
            }
        };

        *state = ResetState::CodeIssued(pending);
        Ok(())
    }

    /// Redeem a code and set the new password.
    ///
    /// Checks run in order: confirmation, expiry, code, length policy.
    ///
    /// # Errors
    /// Returns [`ResetError`] for the first failed check. Mismatches keep
    /// the state at `CodeIssued`; expiry and attempt exhaustion return it to
    /// `AwaitingEmail`.
    pub fn complete(
        &self,
        state: &mut ResetState,
        code: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), ResetError> {
        self.complete_at(state, code, new_password, confirmation, Utc::now())
    }

    /// [`complete`](Self::complete) with an explicit clock.
    ///
    /// # Errors
    /// See [`complete`](Self::complete).
    pub fn complete_at(
        &self,
        state: &mut ResetState,
        code: &str,
        new_password: &str,
        confirmation: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ResetError> {
        let ResetState::CodeIssued(pending) = state else {
            return Err(ResetError::NoPendingReset);
        };

        if new_password != confirmation {
            return Err(ResetError::PasswordMismatch);
        }

        let ttl_secs = i64::try_from(self.settings.code_ttl_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        let ttl = Duration::seconds(ttl_secs);
        if now.signed_duration_since(pending.issued_at) > ttl {
            tracing::info!("Reset code expired");
            *state = ResetState::AwaitingEmail;
            return Err(ResetError::CodeExpired);
        }

        let code_ok = pending.code.as_ref().is_some_and(|c| c.matches(code));
        if !code_ok {
            pending.attempts += 1;
            if pending.attempts >= self.settings.max_attempts {
                tracing::warn!("Reset attempts exhausted; code discarded");
                *state = ResetState::AwaitingEmail;
                return Err(ResetError::AttemptsExhausted);
            }
            return Err(ResetError::CodeMismatch {
                remaining: self.settings.max_attempts - pending.attempts,
            });
        }

        check_password_policy(new_password, self.min_password_len)
            .map_err(|min| ResetError::WeakPassword { min })?;

        let Some(account) = pending.account.as_ref() else {
            // A matching code implies an account; treat anything else as a mismatch.
            return Err(ResetError::CodeMismatch { remaining: 0 });
        };
        let hash = self.hasher.hash(new_password)?;
        self.store.update_password(account, &hash)?;

        tracing::info!("Password reset completed");
        *state = ResetState::Completed;
        Ok(())
    }

    /// Abandon any pending reset.
    pub fn cancel(&self, state: &mut ResetState) {
        if state.is_code_issued() {
            tracing::debug!("Pending reset cancelled");
        }
        *state = ResetState::AwaitingEmail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::notify::tests::RecordingNotifier;
    use crate::adapters::sqlite::SqliteCredentialStore;
    use crate::application::AuthService;
    use crate::domain::password::tests::test_hasher;

    struct Fixture {
        auth: AuthService,
        reset: PasswordResetService,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture_with(notifier: RecordingNotifier) -> Fixture {
        let store: Arc<dyn CredentialStore> =
            Arc::new(SqliteCredentialStore::in_memory().expect("store"));
        let hasher = Arc::new(test_hasher());
        let notifier = Arc::new(notifier);
        let auth = AuthService::new(store.clone(), hasher.clone(), 4);
        auth.register("a@b.com", "old-password", "old-password")
            .expect("register");
        let reset = PasswordResetService::new(
            store,
            notifier.clone(),
            hasher,
            ResetSettings {
                code_ttl_secs: 600,
                max_attempts: 3,
            },
            4,
        );
        Fixture {
            auth,
            reset,
            notifier,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default())
    }

    fn wrong_code(right: &str) -> String {
        if right == "000000" {
            "111111".into()
        } else {
            "000000".into()
        }
    }

    #[test]
    fn test_happy_path() {
        let f = fixture();
        let mut state = ResetState::default();

        f.reset.begin(&mut state, "A@b.com").expect("begin");
        assert!(state.is_code_issued());
        let code = f.notifier.last_code().expect("code dispatched");
        assert_eq!(code.len(), 6);

        f.reset
            .complete(&mut state, &code, "new-password", "new-password")
            .expect("complete");
        assert!(state.is_completed());
        assert!(f.auth.verify("a@b.com", "new-password").expect("verify"));
        assert!(!f.auth.verify("a@b.com", "old-password").expect("verify"));

        // Completed is terminal.
        assert!(matches!(
            f.reset.complete(&mut state, &code, "again-pw", "again-pw"),
            Err(ResetError::NoPendingReset)
        ));
    }

    #[test]
    fn test_completed_reset_starts_a_fresh_cycle() {
        let f = fixture();
        let mut state = ResetState::default();

        f.reset.begin(&mut state, "a@b.com").expect("begin");
        let first = f.notifier.last_code().expect("code");
        f.reset
            .complete(&mut state, &first, "second-pw", "second-pw")
            .expect("complete");
        assert!(state.is_completed());

        f.reset.begin(&mut state, "a@b.com").expect("begin again");
        assert!(state.is_code_issued());
        assert_eq!(f.notifier.count(), 2);
        let second = f.notifier.last_code().expect("new code");

        if first != second {
            assert!(matches!(
                f.reset.complete(&mut state, &first, "third-pw", "third-pw"),
                Err(ResetError::CodeMismatch { remaining: 2 })
            ));
        }
        f.reset
            .complete(&mut state, &second, "third-pw", "third-pw")
            .expect("new code redeems");
        assert!(state.is_completed());
        assert!(f.auth.verify("a@b.com", "third-pw").expect("verify"));
        assert!(!f.auth.verify("a@b.com", "second-pw").expect("verify"));
    }

    #[test]
    fn test_password_mismatch_checked_before_code() {
        let f = fixture();
        let mut state = ResetState::default();
        f.reset.begin(&mut state, "a@b.com").expect("begin");
        let code = f.notifier.last_code().expect("code");

        assert!(matches!(
            f.reset.complete(&mut state, &code, "new-password", "other"),
            Err(ResetError::PasswordMismatch)
        ));
        assert!(matches!(
            f.reset
                .complete(&mut state, &wrong_code(&code), "new-password", "other"),
            Err(ResetError::PasswordMismatch)
        ));
        assert!(matches!(
            f.reset
                .complete(&mut state, &wrong_code(&code), "new-password", "new-password"),
            Err(ResetError::CodeMismatch { remaining: 2 })
        ));
        assert!(state.is_code_issued());

        f.reset
            .complete(&mut state, &code, "new-password", "new-password")
            .expect("still redeemable");
    }

    #[test]
    fn test_expired_code_returns_to_awaiting_email() {
        let f = fixture();
        let mut state = ResetState::default();
        let issued = Utc::now();
        f.reset.begin_at(&mut state, "a@b.com", issued).expect("begin");
        let code = f.notifier.last_code().expect("code");

        let later = issued + Duration::seconds(601);
        assert!(matches!(
            f.reset
                .complete_at(&mut state, &code, "new-password", "new-password", later),
            Err(ResetError::CodeExpired)
        ));
        assert!(matches!(state, ResetState::AwaitingEmail));
        assert!(f.auth.verify("a@b.com", "old-password").expect("verify"));
    }

    #[test]
    fn test_attempt_exhaustion_discards_code() {
        let f = fixture();
        let mut state = ResetState::default();
        f.reset.begin(&mut state, "a@b.com").expect("begin");
        let code = f.notifier.last_code().expect("code");
        let bad = wrong_code(&code);

        for remaining in [2, 1] {
            match f.reset.complete(&mut state, &bad, "new-password", "new-password") {
                Err(ResetError::CodeMismatch { remaining: r }) => assert_eq!(r, remaining),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(
            f.reset.complete(&mut state, &bad, "new-password", "new-password"),
            Err(ResetError::AttemptsExhausted)
        ));
        assert!(matches!(state, ResetState::AwaitingEmail));

        // The old code is gone with the pending state.
        assert!(matches!(
            f.reset.complete(&mut state, &code, "new-password", "new-password"),
            Err(ResetError::NoPendingReset)
        ));
    }

    #[test]
    fn test_unknown_identifier_never_dispatches() {
        let f = fixture();
        let mut state = ResetState::default();

        f.reset.begin(&mut state, "ghost@b.com").expect("same acknowledgement");
        assert!(state.is_code_issued());
        assert_eq!(f.notifier.count(), 0);

        for candidate in ["000000", "123456", "999999"] {
            let result = f
                .reset
                .complete(&mut state, candidate, "new-password", "new-password");
            assert!(matches!(
                result,
                Err(ResetError::CodeMismatch { .. } | ResetError::AttemptsExhausted)
            ));
        }
        assert!(matches!(state, ResetState::AwaitingEmail));
    }

    #[test]
    fn test_weak_password_checked_after_code() {
        let f = fixture();
        let mut state = ResetState::default();
        f.reset.begin(&mut state, "a@b.com").expect("begin");
        let code = f.notifier.last_code().expect("code");

        assert!(matches!(
            f.reset.complete(&mut state, &wrong_code(&code), "abc", "abc"),
            Err(ResetError::CodeMismatch { .. })
        ));
        assert!(matches!(
            f.reset.complete(&mut state, &code, "abc", "abc"),
            Err(ResetError::WeakPassword { min: 4 })
        ));
        assert!(state.is_code_issued());
    }

    #[test]
    fn test_restart_invalidates_previous_code_and_cancel() {
        let f = fixture();
        let mut state = ResetState::default();
        f.reset.begin(&mut state, "a@b.com").expect("begin");
        let first = f.notifier.last_code().expect("code");
        f.reset.begin(&mut state, "a@b.com").expect("restart");
        let second = f.notifier.last_code().expect("code");
        assert_eq!(f.notifier.count(), 2);

        if first != second {
            assert!(matches!(
                f.reset.complete(&mut state, &first, "new-password", "new-password"),
                Err(ResetError::CodeMismatch { .. })
            ));
        }

        f.reset.cancel(&mut state);
        assert!(matches!(state, ResetState::AwaitingEmail));
        assert!(matches!(
            f.reset.complete(&mut state, &second, "new-password", "new-password"),
            Err(ResetError::NoPendingReset)
        ));
    }

    #[test]
    fn test_delivery_failure_keeps_awaiting_email() {
        let f = fixture_with(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let mut state = ResetState::default();

        assert!(matches!(
            f.reset.begin(&mut state, "a@b.com"),
            Err(ResetError::Notification(_))
        ));
        assert!(matches!(state, ResetState::AwaitingEmail));
    }
}
