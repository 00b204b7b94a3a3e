//! Who is currently signed in
//!
//! Seeded lazily from the secret store's last-login marker on first access.
//! A single mutex serializes every read and write.

use crate::core::error::{DriverError, DriverResult};
use crate::core::traits::SecretProvider;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct SessionData {
    current_account: Option<String>,
    is_logged_in: bool,
    initialized: bool,
}

/// Current account and authenticated flag
pub struct SessionState {
    data: Mutex<SessionData>,
    secrets: Arc<dyn SecretProvider>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState").finish_non_exhaustive()
    }
}

impl SessionState {
    pub fn new(secrets: Arc<dyn SecretProvider>) -> Self {
        Self {
            data: Mutex::new(SessionData::default()),
            secrets,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        let mut data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !data.initialized {
            data.initialized = true;
            match self.secrets.last_login_account() {
                Ok(account) => {
                    debug!(?account, "session seeded from last login");
                    data.current_account = account;
                }
                Err(err) => warn!(error = %err, "could not read last login account"),
            }
        }
        data
    }

    /// Account last set or seeded; survives `reset()`
    pub fn current_account(&self) -> Option<String> {
        self.lock().current_account.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock().is_logged_in
    }

    /// Both fields in one consistent read
    pub fn snapshot(&self) -> (Option<String>, bool) {
        let data = self.lock();
        (data.current_account.clone(), data.is_logged_in)
    }

    pub fn set_login_state(&self, account: &str, is_logged_in: bool) -> DriverResult<()> {
        let account = account.trim();
        if account.is_empty() {
            return Err(DriverError::EmptyAccount);
        }

        if is_logged_in {
            self.secrets.set_last_login_account(account)?;
        }

        let mut data = self.lock();
        data.current_account = Some(account.to_string());
        data.is_logged_in = is_logged_in;
        debug!(account, is_logged_in, "session updated");
        Ok(())
    }

    /// Sign out and drop the remembered account, including the stored marker
    pub fn forget(&self) -> DriverResult<()> {
        self.secrets.clear_last_login_account()?;
        let mut data = self.lock();
        data.current_account = None;
        data.is_logged_in = false;
        debug!("session account forgotten");
        Ok(())
    }

    /// Mark signed out, keeping the account for prefill
    pub fn reset(&self) {
        self.lock().is_logged_in = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::secret_store::SqliteSecretStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        last: Option<String>,
        reads: AtomicUsize,
    }

    impl SecretProvider for CountingProvider {
        fn get_or_create_secret(&self, _account: &str) -> DriverResult<String> {
            Ok("Ab3dE5gH9k".to_string())
        }

        fn last_login_account(&self) -> DriverResult<Option<String>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.last.clone())
        }

        fn set_last_login_account(&self, _account: &str) -> DriverResult<()> {
            Ok(())
        }

        fn clear_last_login_account(&self) -> DriverResult<()> {
            Ok(())
        }
    }

    fn empty_session() -> SessionState {
        SessionState::new(Arc::new(SqliteSecretStore::open_in_memory().unwrap()))
    }

    #[test]
    fn test_set_login_state() {
        let session = empty_session();
        session.set_login_state("a@b.com", true).unwrap();

        assert!(session.is_logged_in());
        assert_eq!(session.current_account(), Some("a@b.com".to_string()));
    }

    #[test]
    fn test_reset_keeps_account() {
        let session = empty_session();
        session.set_login_state("a@b.com", true).unwrap();
        session.reset();

        assert!(!session.is_logged_in());
        assert_eq!(session.current_account(), Some("a@b.com".to_string()));
    }

    #[test]
    fn test_blank_account_rejected() {
        let session = empty_session();
        assert!(matches!(
            session.set_login_state("  ", true),
            Err(DriverError::EmptyAccount)
        ));
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_seeded_lazily_once() {
        let provider = Arc::new(CountingProvider {
            last: Some("prefill@example.com".to_string()),
            reads: AtomicUsize::new(0),
        });
        let session = SessionState::new(provider.clone());
        assert_eq!(provider.reads.load(Ordering::SeqCst), 0);

        assert_eq!(
            session.current_account(),
            Some("prefill@example.com".to_string())
        );
        assert!(!session.is_logged_in());
        session.is_logged_in();
        assert_eq!(provider.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seed_from_store_marker() {
        let store = Arc::new(SqliteSecretStore::open_in_memory().unwrap());
        store.get_or_create_secret("user@example.com").unwrap();

        let session = SessionState::new(store);
        assert_eq!(session.snapshot(), (Some("user@example.com".to_string()), false));
    }

    #[test]
    fn test_login_persists_marker_and_forget_clears_it() {
        let store = Arc::new(SqliteSecretStore::open_in_memory().unwrap());
        let session = SessionState::new(store.clone());

        session.set_login_state("user@example.com", false).unwrap();
        assert_eq!(store.last_login_account().unwrap(), None);

        session.set_login_state("user@example.com", true).unwrap();
        assert_eq!(
            store.last_login_account().unwrap(),
            Some("user@example.com".to_string())
        );
        assert_eq!(
            SessionState::new(store.clone()).current_account(),
            Some("user@example.com".to_string())
        );

        session.forget().unwrap();
        assert_eq!(session.snapshot(), (None, false));
        assert_eq!(store.last_login_account().unwrap(), None);
    }

    #[test]
    fn test_explicit_state_wins_over_seed() {
        let provider = Arc::new(CountingProvider {
            last: Some("old@example.com".to_string()),
            reads: AtomicUsize::new(0),
        });
        let session = SessionState::new(provider);
        session.set_login_state("new@example.com", true).unwrap();
        assert_eq!(session.current_account(), Some("new@example.com".to_string()));
    }
}
