//! SQLite adapter: Implementation of CredentialStore.
//!
//! Accounts live in a single `userstable`. The primary key on
//! `identifier` is the authoritative uniqueness guard; a constraint
//! violation on insert maps to [`StoreError::AlreadyExists`].
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. A poisoned mutex (from a panic
//! in another thread) is reported as [`StoreError::Unavailable`] rather
//! than reused.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::domain::{Identifier, PasswordHash, UserAccount};
use crate::ports::{CredentialStore, StoreError};

/// SQLite credential store.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

fn db_error(e: &rusqlite::Error) -> StoreError {
    StoreError::Unavailable(format!("database error: {e}"))
}

impl SqliteCredentialStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("cannot create data dir: {e}")))?;
        }
        let conn = Connection::open(path).map_err(|e| db_error(&e))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::info!("Opened SQLite credential store at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| db_error(&e))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".into()))
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS userstable (
                identifier TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| db_error(&e))?;

        Ok(())
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn find_user(&self, identifier: &Identifier) -> Result<Option<UserAccount>, StoreError> {
        let conn = self.lock()?;

        let hash: Option<String> = conn
            .query_row(
                "SELECT password_hash FROM userstable WHERE identifier = ?1",
                params![identifier.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error(&e))?;

        Ok(hash.map(|h| UserAccount::new(identifier.clone(), PasswordHash::from_encoded(h))))
    }

    fn create_user(
        &self,
        identifier: &Identifier,
        password_hash: &PasswordHash,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();

        match conn.execute(
            "INSERT INTO userstable (identifier, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![identifier.as_str(), password_hash.as_str(), now],
        ) {
            Ok(_) => {
                tracing::debug!("Inserted account row");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => Err(db_error(&e)),
        }
    }

    fn update_password(
        &self,
        identifier: &Identifier,
        new_hash: &PasswordHash,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE userstable SET password_hash = ?1 WHERE identifier = ?2",
                params![new_hash.as_str(), identifier.as_str()],
            )
            .map_err(|e| db_error(&e))?;

        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn list_identifiers(&self) -> Result<Vec<Identifier>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT identifier FROM userstable ORDER BY created_at, identifier")
            .map_err(|e| db_error(&e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| db_error(&e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| db_error(&e))?;

        rows.iter()
            .map(|raw| {
                Identifier::parse(raw)
                    .map_err(|e| StoreError::Malformed(format!("stored identifier: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).expect("valid identifier")
    }

    fn hash(s: &str) -> PasswordHash {
        PasswordHash::from_encoded(s)
    }

    #[test]
    fn test_create_and_find() {
        let store = SqliteCredentialStore::in_memory().expect("store");
        assert!(store.find_user(&id("a@b.com")).expect("query").is_none());

        store.create_user(&id("a@b.com"), &hash("H1")).expect("create");
        let account = store
            .find_user(&id("A@B.com"))
            .expect("query")
            .expect("account present");
        assert_eq!(account.identifier.as_str(), "a@b.com");
        assert_eq!(account.password_hash.as_str(), "H1");
    }

    #[test]
    fn test_duplicate_create_keeps_first_hash() {
        let store = SqliteCredentialStore::in_memory().expect("store");
        store.create_user(&id("a@b.com"), &hash("H1")).expect("create");

        let err = store
            .create_user(&id("a@b.com"), &hash("H2"))
            .expect_err("duplicate must fail");
        assert!(matches!(err, StoreError::AlreadyExists));

        let account = store.find_user(&id("a@b.com")).expect("query").expect("present");
        assert_eq!(account.password_hash.as_str(), "H1");
    }

    #[test]
    fn test_update_password() {
        let store = SqliteCredentialStore::in_memory().expect("store");
        assert!(matches!(
            store.update_password(&id("ghost@b.com"), &hash("H")),
            Err(StoreError::NotFound)
        ));

        store.create_user(&id("a@b.com"), &hash("H1")).expect("create");
        store.update_password(&id("a@b.com"), &hash("H2")).expect("update");
        let account = store.find_user(&id("a@b.com")).expect("query").expect("present");
        assert_eq!(account.password_hash.as_str(), "H2");
    }

    #[test]
    fn test_list_identifiers() {
        let store = SqliteCredentialStore::in_memory().expect("store");
        store.create_user(&id("one@b.com"), &hash("H")).expect("create");
        store.create_user(&id("two@b.com"), &hash("H")).expect("create");

        let mut ids: Vec<String> = store
            .list_identifiers()
            .expect("list")
            .into_iter()
            .map(|i| i.as_str().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["one@b.com", "two@b.com"]);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("users.db");
        {
            let store = SqliteCredentialStore::new(&path).expect("open");
            store.create_user(&id("a@b.com"), &hash("H1")).expect("create");
        }
        let store = SqliteCredentialStore::new(&path).expect("reopen");
        assert!(store.find_user(&id("a@b.com")).expect("query").is_some());
    }
}
