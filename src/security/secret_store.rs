//! Per-account keychain passphrase store backed by SQLite
//!
//! Every tool invocation is authorized with a passphrase tied to the account.
//! The passphrase is generated once, persisted, and returned unchanged on
//! every later lookup: regenerating it would silently invalidate the
//! credentials the external tool already encrypted with the old value.

use crate::core::error::{DriverError, DriverResult};
use crate::core::traits::SecretProvider;
use rand::Rng;
use rand::distributions::Uniform;
use rand::rngs::OsRng;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Length of a generated secret
pub const SECRET_LENGTH: usize = 10;

/// Alphabet secrets are drawn from
const SECRET_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Settings key holding the last account that obtained a secret
const LAST_LOGIN_KEY: &str = "LastLoginUsername";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS Users (
        Id INTEGER PRIMARY KEY AUTOINCREMENT,
        Username TEXT NOT NULL UNIQUE,
        SecretKey TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS Settings (
        Key TEXT PRIMARY KEY,
        Value TEXT NOT NULL
    );";

/// Generates a secret uniformly from `[A-Za-z0-9]` using the OS random source
pub fn generate_secret() -> String {
    let dist = Uniform::from(0..SECRET_CHARSET.len());
    let mut rng = OsRng;
    (0..SECRET_LENGTH)
        .map(|_| SECRET_CHARSET[rng.sample(&dist)] as char)
        .collect()
}

/// SQLite-backed secret store
///
/// The connection is guarded by a single mutex; each public operation runs
/// its reads and writes inside one immediate transaction.
pub struct SqliteSecretStore {
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSecretStore").finish_non_exhaustive()
    }
}

impl SqliteSecretStore {
    /// Open (creating if needed) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> DriverResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(DriverError::storage)?;
        }

        let connection = Connection::open(path)?;
        debug!(path = %path.display(), "opened secret store");
        Self::with_connection(connection)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> DriverResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> DriverResult<Self> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn normalize(account: &str) -> DriverResult<&str> {
        let account = account.trim();
        if account.is_empty() {
            return Err(DriverError::EmptyAccount);
        }
        Ok(account)
    }

    fn lock(&self) -> DriverResult<std::sync::MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| DriverError::storage("secret store lock poisoned"))
    }

    fn select_secret(connection: &Connection, account: &str) -> rusqlite::Result<Option<String>> {
        connection
            .query_row(
                "SELECT SecretKey FROM Users WHERE Username = ?1",
                params![account],
                |row| row.get(0),
            )
            .optional()
    }

    fn upsert_secret(connection: &Connection, account: &str, secret: &str) -> rusqlite::Result<()> {
        connection.execute(
            "INSERT INTO Users (Username, SecretKey) VALUES (?1, ?2)
             ON CONFLICT(Username) DO UPDATE SET SecretKey = excluded.SecretKey",
            params![account, secret],
        )?;
        Ok(())
    }

    fn upsert_setting(connection: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
        connection.execute(
            "INSERT INTO Settings (Key, Value) VALUES (?1, ?2)
             ON CONFLICT(Key) DO UPDATE SET Value = excluded.Value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Read-only lookup; never generates
    pub fn get_secret(&self, account: &str) -> DriverResult<Option<String>> {
        let account = Self::normalize(account)?;
        let connection = self.lock()?;
        Ok(Self::select_secret(&connection, account)?
            .filter(|secret| !secret.is_empty()))
    }

    /// Return the account's secret, generating and persisting one if absent
    ///
    /// Also records the account as the last one used.
    pub fn get_or_create_secret(&self, account: &str) -> DriverResult<String> {
        let account = Self::normalize(account)?;
        let mut connection = self.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let secret = match Self::select_secret(&tx, account)?.filter(|s| !s.is_empty()) {
            Some(existing) => existing,
            None => {
                let generated = generate_secret();
                Self::upsert_secret(&tx, account, &generated)?;
                info!(account, "generated keychain secret");
                generated
            }
        };

        Self::upsert_setting(&tx, LAST_LOGIN_KEY, account)?;
        tx.commit()?;
        Ok(secret)
    }

    /// Replace the account's secret; the only path that changes an issued secret
    pub fn regenerate_secret(&self, account: &str) -> DriverResult<String> {
        let account = Self::normalize(account)?;
        let connection = self.lock()?;
        let generated = generate_secret();
        Self::upsert_secret(&connection, account, &generated)?;
        info!(account, "regenerated keychain secret");
        Ok(generated)
    }

    /// Last account recorded by `get_or_create_secret`
    pub fn last_login_account(&self) -> DriverResult<Option<String>> {
        let connection = self.lock()?;
        let value: Option<String> = connection
            .query_row(
                "SELECT Value FROM Settings WHERE Key = ?1",
                params![LAST_LOGIN_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.filter(|v| !v.trim().is_empty()))
    }

    pub fn set_last_login_account(&self, account: &str) -> DriverResult<()> {
        let account = Self::normalize(account)?;
        let connection = self.lock()?;
        Self::upsert_setting(&connection, LAST_LOGIN_KEY, account)?;
        Ok(())
    }

    pub fn clear_last_login_account(&self) -> DriverResult<()> {
        let connection = self.lock()?;
        connection.execute(
            "DELETE FROM Settings WHERE Key = ?1",
            params![LAST_LOGIN_KEY],
        )?;
        Ok(())
    }
}

impl SecretProvider for SqliteSecretStore {
    fn get_or_create_secret(&self, account: &str) -> DriverResult<String> {
        SqliteSecretStore::get_or_create_secret(self, account)
    }

    fn last_login_account(&self) -> DriverResult<Option<String>> {
        SqliteSecretStore::last_login_account(self)
    }

    fn set_last_login_account(&self, account: &str) -> DriverResult<()> {
        SqliteSecretStore::set_last_login_account(self, account)
    }

    fn clear_last_login_account(&self) -> DriverResult<()> {
        SqliteSecretStore::clear_last_login_account(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_LENGTH);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_secrets_differ() {
        let secrets: HashSet<String> = (0..50).map(|_| generate_secret()).collect();
        assert!(secrets.len() > 45);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SqliteSecretStore::open_in_memory().unwrap();
        let first = store.get_or_create_secret("user@example.com").unwrap();
        let second = store.get_or_create_secret("user@example.com").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_accounts_get_distinct_secrets() {
        let store = SqliteSecretStore::open_in_memory().unwrap();
        let a = store.get_or_create_secret("a@example.com").unwrap();
        let b = store.get_or_create_secret("b@example.com").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_blank_account_is_rejected() {
        let store = SqliteSecretStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get_or_create_secret("   "),
            Err(DriverError::EmptyAccount)
        ));
        assert!(matches!(store.get_secret(""), Err(DriverError::EmptyAccount)));
    }

    #[test]
    fn test_get_secret_does_not_generate() {
        let store = SqliteSecretStore::open_in_memory().unwrap();
        assert_eq!(store.get_secret("user@example.com").unwrap(), None);
        let created = store.get_or_create_secret("user@example.com").unwrap();
        assert_eq!(store.get_secret("user@example.com").unwrap(), Some(created));
    }

    #[test]
    fn test_last_login_marker_follows_secret_use() {
        let store = SqliteSecretStore::open_in_memory().unwrap();
        assert_eq!(store.last_login_account().unwrap(), None);

        store.get_or_create_secret("a@example.com").unwrap();
        store.get_or_create_secret("b@example.com").unwrap();
        assert_eq!(
            store.last_login_account().unwrap(),
            Some("b@example.com".to_string())
        );

        store.set_last_login_account("  a@example.com ").unwrap();
        assert_eq!(
            store.last_login_account().unwrap(),
            Some("a@example.com".to_string())
        );
        assert!(store.set_last_login_account(" ").is_err());

        store.clear_last_login_account().unwrap();
        assert_eq!(store.last_login_account().unwrap(), None);
    }

    #[test]
    fn test_regenerate_replaces_secret() {
        let store = SqliteSecretStore::open_in_memory().unwrap();
        let original = store.get_or_create_secret("user@example.com").unwrap();
        let rotated = store.regenerate_secret("user@example.com").unwrap();

        assert_ne!(original, rotated);
        assert_eq!(
            store.get_or_create_secret("user@example.com").unwrap(),
            rotated
        );
    }

    #[test]
    fn test_secret_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("KeychainConfig.db");

        let secret = {
            let store = SqliteSecretStore::open(&path).unwrap();
            store.get_or_create_secret("user@example.com").unwrap()
        };

        let reopened = SqliteSecretStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_or_create_secret("user@example.com").unwrap(),
            secret
        );
        assert_eq!(
            reopened.last_login_account().unwrap(),
            Some("user@example.com".to_string())
        );
    }
}
