//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `model`: JSON model artifacts with Ed25519-signed manifests
//! - `sqlite`: SQLite credential table
//! - `sheets`: Google Sheets credential worksheet (ureq)
//! - `notify`: one-time code delivery
//! - `sanitize`: PII filtering for logs

pub mod model;
pub mod notify;
pub mod sanitize;
pub mod sheets;
pub mod sqlite;

use std::sync::Arc;

pub use model::{ModelClassifier, ModelError};

use crate::config::{NotifySettings, StoreBackend, StoreSettings};
use crate::ports::{CodeNotifier, CredentialStore, StoreError};

/// Build the configured credential store. Called once at startup.
///
/// # Errors
/// Returns [`StoreError::Unavailable`] if the backend cannot be opened.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn CredentialStore>, StoreError> {
    match settings.backend {
        StoreBackend::Sqlite => Ok(Arc::new(sqlite::SqliteCredentialStore::new(
            &settings.sqlite_path,
        )?)),
        StoreBackend::Sheets => {
            let client = sheets::SheetsApiClient::new(settings)?;
            tracing::info!(
                "Using spreadsheet credential store (sheet={:?}, timeout={}s)",
                settings.sheets.sheet_name,
                settings.timeout_secs
            );
            Ok(Arc::new(sheets::SheetCredentialStore::new(client)))
        }
    }
}

/// Build the configured code notifier.
#[must_use]
pub fn open_notifier(settings: &NotifySettings) -> Arc<dyn CodeNotifier> {
    match &settings.outbox {
        Some(path) => Arc::new(notify::OutboxNotifier::new(path.clone())),
        None => Arc::new(notify::ConsoleNotifier),
    }
}
