//! Code delivery adapters: Implementations of CodeNotifier.
//!
//! - `ConsoleNotifier`: prints the code to stdout for local demos
//! - `OutboxNotifier`: appends one JSON line per code to an outbox file
//!   that an external mail relay drains
//!
//! Neither adapter logs the code itself.

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::domain::{Identifier, OneTimeCode};
use crate::ports::{CodeNotifier, NotifyError};

/// Prints codes to stdout.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl CodeNotifier for ConsoleNotifier {
    fn send_code(&self, recipient: &Identifier, code: &OneTimeCode) -> Result<(), NotifyError> {
        let mut out = std::io::stdout().lock();
        writeln!(
            out,
            "[cardiorisk] Password reset code for {recipient}: {}",
            code.expose()
        )
        .and_then(|()| out.flush())
        .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        tracing::info!("Reset code printed to console");
        Ok(())
    }
}

#[derive(Serialize)]
struct OutboxMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: String,
    queued_at: String,
}

/// Appends codes to a JSON-lines outbox file (mode 0600 on Unix).
pub struct OutboxNotifier {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxNotifier {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl CodeNotifier for OutboxNotifier {
    fn send_code(&self, recipient: &Identifier, code: &OneTimeCode) -> Result<(), NotifyError> {
        let message = OutboxMessage {
            to: recipient.as_str(),
            subject: "CardioRisk password reset",
            body: format!("Your password reset code is: {}", code.expose()),
            queued_at: chrono::Utc::now().to_rfc3339(),
        };
        let mut line = serde_json::to_vec(&message)
            .map_err(|e| NotifyError::Delivery(format!("cannot encode message: {e}")))?;
        line.push(b'\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| NotifyError::Delivery("outbox lock poisoned".into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| NotifyError::Delivery(format!("cannot create outbox dir: {e}")))?;
        }
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        opts.mode(0o600);
        let mut file = opts
            .open(&self.path)
            .map_err(|e| NotifyError::Delivery(format!("cannot open outbox: {e}")))?;
        file.write_all(&line)
            .map_err(|e| NotifyError::Delivery(format!("cannot write outbox: {e}")))?;

        tracing::info!("Reset code queued in outbox {:?}", self.path);
        Ok(())
    }
}
