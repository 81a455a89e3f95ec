//! Spreadsheet adapter: Implementation of CredentialStore over Google Sheets.
//!
//! Column A holds the identifier, column B the password hash. An optional
//! header row (`Email | Password`) is skipped. When the sheet contains
//! duplicate identifiers the first row wins, for reads and for updates.
//!
//! # Security
//!
//! - The bearer token is read from a file (or Docker secret) and held in
//!   `Zeroizing` memory
//! - Request failures surface as [`StoreError::Unavailable`] with no retry
//! - Error messages never include identifiers or hashes

use std::path::Path;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;
use zeroize::Zeroizing;

use crate::config::{SheetsSettings, StoreSettings};
use crate::domain::{Identifier, PasswordHash, UserAccount};
use crate::ports::{CredentialStore, StoreError};

/// Token sources, highest precedence first:
/// - `store.sheets.token_file` / `CARDIORISK_SHEETS_TOKEN_FILE`
/// - `/run/secrets/cardiorisk_sheets_token` (Docker/Compose secret default)
/// - `CARDIORISK_SHEETS_TOKEN` (debug builds only)
const TOKEN_DOCKER_SECRET_PATH: &str = "/run/secrets/cardiorisk_sheets_token";
const TOKEN_ENV_DEV: &str = "CARDIORISK_SHEETS_TOKEN";

const HEADER_LABELS: [&str; 4] = ["email", "identifier", "username", "user"];

/// Minimal row-level access to one worksheet.
///
/// Row numbers are 1-based, as shown in the spreadsheet UI.
pub trait SheetClient: Send + Sync {
    /// Read columns A:B of every non-empty row.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] if the sheet cannot be read.
    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError>;

    /// Append one row after the last non-empty row.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] if the write fails.
    fn append_row(&self, cells: &[&str]) -> Result<(), StoreError>;

    /// Overwrite a single cell.
    ///
    /// # Errors
    /// Returns [`StoreError::Unavailable`] if the write fails.
    fn update_cell(&self, row: usize, column: char, value: &str) -> Result<(), StoreError>;
}

/// Read the sheet access token.
///
/// # Errors
/// Returns [`StoreError::Unavailable`] if no source yields a non-empty token.
pub fn read_token(settings: &SheetsSettings) -> Result<Zeroizing<String>, StoreError> {
    fn from_file(path: &Path) -> Result<Zeroizing<String>, StoreError> {
        let content = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot read sheets token file: {e}"))
        })?);
        let token = content.trim().to_string();
        if token.is_empty() {
            return Err(StoreError::Unavailable("sheets token file is empty".into()));
        }
        Ok(Zeroizing::new(token))
    }

    // 1) Explicit file path
    if let Some(path) = &settings.token_file {
        return from_file(path);
    }

    // 2) Docker secrets default path
    if Path::new(TOKEN_DOCKER_SECRET_PATH).exists() {
        return from_file(Path::new(TOKEN_DOCKER_SECRET_PATH));
    }

    // 3) Dev-only env var (refused in release builds)
    if cfg!(debug_assertions) {
        if let Ok(v) = std::env::var(TOKEN_ENV_DEV) {
            let token = v.trim().to_string();
            if !token.is_empty() {
                tracing::warn!("Using sheets token from {TOKEN_ENV_DEV} (debug build only)");
                return Ok(Zeroizing::new(token));
            }
        }
    }

    Err(StoreError::Unavailable(format!(
        "missing sheets token: set store.sheets.token_file or mount {TOKEN_DOCKER_SECRET_PATH}"
    )))
}

/// Characters escaped in an A1 range path segment.
const RANGE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b':');

/// Percent-encode an A1 range for use in a URL path segment.
fn encode_range(range: &str) -> String {
    utf8_percent_encode(range, RANGE_SET).to_string()
}

fn quote_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Google Sheets values API client.
pub struct SheetsApiClient {
    agent: ureq::Agent,
    values_url: String,
    sheet: String,
    token: Zeroizing<String>,
}

impl SheetsApiClient {
    /// # Errors
    /// Returns [`StoreError::Unavailable`] if the token cannot be read.
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        let token = read_token(&settings.sheets)?;
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(settings.timeout_secs)))
            .build();

        Ok(Self {
            agent: config.into(),
            values_url: format!(
                "{}/{}/values",
                settings.sheets.api_base.trim_end_matches('/'),
                settings.sheets.spreadsheet_id
            ),
            sheet: quote_sheet(&settings.sheets.sheet_name),
            token,
        })
    }

    fn url(&self, range: &str, suffix: &str) -> String {
        format!(
            "{}/{}{suffix}",
            self.values_url,
            encode_range(&format!("{}!{range}", self.sheet))
        )
    }

    fn bearer(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("Bearer {}", self.token.as_str()))
    }
}

fn transport_error(op: &str, e: &ureq::Error) -> StoreError {
    tracing::warn!("Sheets {op} failed: {e}");
    StoreError::Unavailable(format!("spreadsheet {op} failed: {e}"))
}

impl SheetClient for SheetsApiClient {
    fn read_rows(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let bearer = self.bearer();
        let mut response = self
            .agent
            .get(&self.url("A:B", ""))
            .header("Authorization", bearer.as_str())
            .call()
            .map_err(|e| transport_error("read", &e))?;
        let range: ValueRange = response
            .body_mut()
            .read_json()
            .map_err(|e| transport_error("read", &e))?;
        Ok(range.values)
    }

    fn append_row(&self, cells: &[&str]) -> Result<(), StoreError> {
        let bearer = self.bearer();
        self.agent
            .post(&self.url("A:B", ":append"))
            .query("valueInputOption", "RAW")
            .query("insertDataOption", "INSERT_ROWS")
            .header("Authorization", bearer.as_str())
            .send_json(json!({ "values": [cells] }))
            .map_err(|e| transport_error("append", &e))?;
        Ok(())
    }

    fn update_cell(&self, row: usize, column: char, value: &str) -> Result<(), StoreError> {
        let bearer = self.bearer();
        self.agent
            .put(&self.url(&format!("{column}{row}"), ""))
            .query("valueInputOption", "RAW")
            .header("Authorization", bearer.as_str())
            .send_json(json!({ "values": [[value]] }))
            .map_err(|e| transport_error("update", &e))?;
        Ok(())
    }
}

/// One parsed credential row.
struct SheetRow {
    number: usize,
    identifier: Identifier,
    hash: String,
}

/// Credential store backed by a worksheet.
pub struct SheetCredentialStore<C: SheetClient> {
    client: C,
}

impl<C: SheetClient> SheetCredentialStore<C> {
    #[must_use]
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn rows(&self) -> Result<Vec<SheetRow>, StoreError> {
        let raw = self.client.read_rows()?;
        let mut rows = Vec::with_capacity(raw.len());

        for (idx, cells) in raw.iter().enumerate() {
            let first = cells.first().map_or("", |c| c.trim());
            if idx == 0 && HEADER_LABELS.contains(&first.to_ascii_lowercase().as_str()) {
                continue;
            }
            if first.is_empty() {
                continue;
            }
            let Ok(identifier) = Identifier::parse(first) else {
                tracing::warn!("Skipping sheet row {} with unusable identifier", idx + 1);
                continue;
            };
            let hash = cells.get(1).map_or("", |c| c.trim());
            if hash.is_empty() {
                tracing::warn!("Skipping sheet row {} without a password hash", idx + 1);
                continue;
            }
            rows.push(SheetRow {
                number: idx + 1,
                identifier,
                hash: hash.to_string(),
            });
        }

        Ok(rows)
    }

    fn first_match(&self, identifier: &Identifier) -> Result<Option<SheetRow>, StoreError> {
        Ok(self
            .rows()?
            .into_iter()
            .find(|row| &row.identifier == identifier))
    }
}

impl<C: SheetClient> CredentialStore for SheetCredentialStore<C> {
    fn find_user(&self, identifier: &Identifier) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.first_match(identifier)?.map(|row| {
            UserAccount::new(row.identifier, PasswordHash::from_encoded(row.hash))
        }))
    }

    fn create_user(
        &self,
        identifier: &Identifier,
        password_hash: &PasswordHash,
    ) -> Result<(), StoreError> {
        // The sheet has no uniqueness constraint; this check is best effort.
        if self.first_match(identifier)?.is_some() {
            return Err(StoreError::AlreadyExists);
        }
        self.client
            .append_row(&[identifier.as_str(), password_hash.as_str()])
    }

    fn update_password(
        &self,
        identifier: &Identifier,
        new_hash: &PasswordHash,
    ) -> Result<(), StoreError> {
        let row = self.first_match(identifier)?.ok_or(StoreError::NotFound)?;
        self.client.update_cell(row.number, 'B', new_hash.as_str())
    }

    fn list_identifiers(&self) -> Result<Vec<Identifier>, StoreError> {
        let mut seen = Vec::new();
        for row in self.rows()? {
            if !seen.contains(&row.identifier) {
                seen.push(row.identifier);
            }
        }
        Ok(seen)
    }
}
