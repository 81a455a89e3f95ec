//! Runtime configuration.
//!
//! Loaded once at startup: an optional JSON file named by
//! `CARDIORISK_CONFIG`, then `CARDIORISK_*` environment overrides on top.
//! Every section has defaults, so an empty environment yields a working
//! local setup (SQLite store, `models/` artifact directory).
//!
//! Secrets never live in this struct. The sheet access token is read from
//! a file by the spreadsheet adapter.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{HashingParams, ValidationPolicy};

pub const CONFIG_PATH_ENV: &str = "CARDIORISK_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid config file: {0}")]
    Parse(String),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub store: StoreSettings,
    pub auth: AuthSettings,
    pub reset: ResetSettings,
    pub notify: NotifySettings,
    pub validation: ValidationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory holding `model.json` (and optionally the signed manifest),
    /// or a direct path to the model file.
    pub dir: PathBuf,
    /// Base64 Ed25519 public key trusted to sign model manifests.
    pub public_key_b64: Option<String>,
    /// Load unsigned models. Honoured in debug builds only.
    pub allow_unsigned: bool,
    /// Lowest manifest serial accepted. Raise it after each release to
    /// refuse older signed models.
    pub min_serial: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            public_key_b64: None,
            allow_unsigned: false,
            min_serial: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Sheets,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" | "table" => Ok(Self::Sqlite),
            "sheets" | "sheet" | "spreadsheet" => Ok(Self::Sheets),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    pub sheets: SheetsSettings,
    /// Global timeout for one spreadsheet request, in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: PathBuf::from("data/cardiorisk.db"),
            sheets: SheetsSettings::default(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsSettings {
    pub spreadsheet_id: String,
    /// Worksheet (tab) name; columns A and B hold identifier and hash.
    pub sheet_name: String,
    pub api_base: String,
    /// File holding the OAuth bearer token. Falls back to the Docker
    /// secret path when unset.
    pub token_file: Option<PathBuf>,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: "Sheet1".to_string(),
            api_base: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            token_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub min_password_len: usize,
    pub hashing: HashingParams,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            min_password_len: 4,
            hashing: HashingParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetSettings {
    pub code_ttl_secs: u64,
    pub max_attempts: u32,
}

impl Default for ResetSettings {
    fn default() -> Self {
        Self {
            code_ttl_secs: 600,
            max_attempts: 5,
        }
    }
}

/// Where one-time codes are handed off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Append codes as JSON lines to this file for a mail relay to pick
    /// up. When unset, codes are printed to the console.
    pub outbox: Option<PathBuf>,
}

impl Settings {
    /// Load from `CARDIORISK_CONFIG` (if set) and the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file is unreadable or a value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        settings.apply_env_overrides(|var| std::env::var(var).ok())?;
        settings.check()?;
        Ok(settings)
    }

    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let settings =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(settings)
    }

    /// Apply `CARDIORISK_*` overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidEnv`] if a value does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CARDIORISK_MODEL_DIR") {
            self.model.dir = PathBuf::from(v.trim());
        }
        if let Some(v) = get("CARDIORISK_MODEL_PUBLIC_KEY") {
            self.model.public_key_b64 = Some(v.trim().to_string());
        }
        if let Some(v) = get("CARDIORISK_ALLOW_UNSIGNED_MODEL") {
            self.model.allow_unsigned = parse_flag("CARDIORISK_ALLOW_UNSIGNED_MODEL", &v)?;
        }
        if let Some(v) = get("CARDIORISK_MODEL_MIN_SERIAL") {
            self.model.min_serial = parse_num("CARDIORISK_MODEL_MIN_SERIAL", &v)?;
        }

        if let Some(v) = get("CARDIORISK_STORE_BACKEND") {
            self.store.backend = v.parse().map_err(|()| ConfigError::InvalidEnv {
                var: "CARDIORISK_STORE_BACKEND",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("CARDIORISK_DB_PATH") {
            self.store.sqlite_path = PathBuf::from(v.trim());
        }
        if let Some(v) = get("CARDIORISK_SHEET_ID") {
            self.store.sheets.spreadsheet_id = v.trim().to_string();
        }
        if let Some(v) = get("CARDIORISK_SHEET_NAME") {
            self.store.sheets.sheet_name = v.trim().to_string();
        }
        if let Some(v) = get("CARDIORISK_SHEETS_TOKEN_FILE") {
            self.store.sheets.token_file = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("CARDIORISK_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_num("CARDIORISK_STORE_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("CARDIORISK_MIN_PASSWORD_LEN") {
            self.auth.min_password_len = parse_num("CARDIORISK_MIN_PASSWORD_LEN", &v)?;
        }
        if let Some(v) = get("CARDIORISK_RESET_CODE_TTL_SECS") {
            self.reset.code_ttl_secs = parse_num("CARDIORISK_RESET_CODE_TTL_SECS", &v)?;
        }
        if let Some(v) = get("CARDIORISK_RESET_MAX_ATTEMPTS") {
            self.reset.max_attempts = parse_num("CARDIORISK_RESET_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("CARDIORISK_NOTIFY_OUTBOX") {
            self.notify.outbox = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("CARDIORISK_REJECT_INVERTED_BP") {
            self.validation.reject_inverted_bp = parse_flag("CARDIORISK_REJECT_INVERTED_BP", &v)?;
        }

        Ok(())
    }

    /// Cross-field checks that serde cannot express.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first bad setting.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Sheets && self.store.sheets.spreadsheet_id.is_empty()
        {
            return Err(ConfigError::Invalid(
                "store.backend = sheets requires store.sheets.spreadsheet_id".into(),
            ));
        }
        if self.store.timeout_secs == 0 {
            return Err(ConfigError::Invalid("store.timeout_secs must be > 0".into()));
        }
        if self.reset.max_attempts == 0 {
            return Err(ConfigError::Invalid("reset.max_attempts must be > 0".into()));
        }
        if self.reset.code_ttl_secs == 0 {
            return Err(ConfigError::Invalid("reset.code_ttl_secs must be > 0".into()));
        }
        if self.auth.min_password_len == 0 {
            return Err(ConfigError::Invalid("auth.min_password_len must be > 0".into()));
        }
        Ok(())
    }
}

fn parse_num<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
        assert_eq!(settings.reset.code_ttl_secs, 600);
        assert_eq!(settings.reset.max_attempts, 5);
        assert_eq!(settings.auth.min_password_len, 4);
        assert_eq!(settings.store.timeout_secs, 10);
        assert!(!settings.validation.reject_inverted_bp);
        assert!(settings.check().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "reset": { "max_attempts": 3 }, "store": { "backend": "sheets",
                 "sheets": { "spreadsheet_id": "abc" } } }"#,
        )
        .expect("write config");

        let settings = Settings::from_file(&path).expect("parse");
        assert_eq!(settings.reset.max_attempts, 3);
        assert_eq!(settings.reset.code_ttl_secs, 600);
        assert_eq!(settings.store.backend, StoreBackend::Sheets);
        assert_eq!(settings.store.sheets.sheet_name, "Sheet1");
        assert!(settings.check().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env_overrides(env(&[
                ("CARDIORISK_STORE_BACKEND", "Spreadsheet"),
                ("CARDIORISK_SHEET_ID", "sheet-123"),
                ("CARDIORISK_RESET_CODE_TTL_SECS", "120"),
                ("CARDIORISK_REJECT_INVERTED_BP", "yes"),
                ("CARDIORISK_DB_PATH", "  "),
                ("CARDIORISK_MODEL_MIN_SERIAL", "42"),
            ]))
            .expect("overrides apply");

        assert_eq!(settings.store.backend, StoreBackend::Sheets);
        assert_eq!(settings.store.sheets.spreadsheet_id, "sheet-123");
        assert_eq!(settings.reset.code_ttl_secs, 120);
        assert!(settings.validation.reject_inverted_bp);
        assert_eq!(settings.model.min_serial, 42);
        assert_eq!(settings.store.sqlite_path, PathBuf::from("data/cardiorisk.db"));
    }

    #[test]
    fn test_invalid_env_values() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env_overrides(env(&[("CARDIORISK_RESET_MAX_ATTEMPTS", "many")]))
            .expect_err("non-numeric must fail");
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "CARDIORISK_RESET_MAX_ATTEMPTS",
                ..
            }
        ));

        let err = settings
            .apply_env_overrides(env(&[("CARDIORISK_STORE_BACKEND", "postgres")]))
            .expect_err("unknown backend must fail");
        assert!(err.to_string().contains("CARDIORISK_STORE_BACKEND"));
    }

    #[test]
    fn test_sheets_backend_requires_id() {
        let mut settings = Settings::default();
        settings.store.backend = StoreBackend::Sheets;
        assert!(matches!(settings.check(), Err(ConfigError::Invalid(_))));
    }
}
