//! Shared services behind every tool call
//!
//! Constructed once and handed to the login service and the client facade.
//! Nothing in the crate is a process-wide static.

use crate::classify::classifier::ResponseClassifier;
use crate::core::config::{DEFAULT_PASSPHRASE_ENV, DEFAULT_TIMEOUT_SECS, DriverConfig};
use crate::core::error::{DriverError, DriverResult};
use crate::core::session::SessionState;
use crate::core::traits::{SecretProvider, ToolRunner};
use crate::process::command::{ToolCommand, ToolInvocation};
use crate::process::invoker::ProcessInvoker;
use crate::security::secret_store::SqliteSecretStore;
use crate::security::token_manager::KeychainTokenManager;
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct DriverContext {
    runner: Arc<dyn ToolRunner>,
    secrets: Arc<dyn SecretProvider>,
    session: Arc<SessionState>,
    classifier: ResponseClassifier,
    passphrases: KeychainTokenManager,
    timeout: Duration,
    extra_env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl std::fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverContext")
            .field("timeout", &self.timeout)
            .field("passphrase_env", &self.passphrases.passphrase_env())
            .finish_non_exhaustive()
    }
}

impl DriverContext {
    /// Context with default timeout and passphrase override variable
    pub fn new(runner: Arc<dyn ToolRunner>, secrets: Arc<dyn SecretProvider>) -> Self {
        let session = Arc::new(SessionState::new(secrets.clone()));
        Self {
            runner,
            secrets,
            session,
            classifier: ResponseClassifier::default(),
            passphrases: KeychainTokenManager::new(DEFAULT_PASSPHRASE_ENV),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            extra_env: HashMap::new(),
            working_dir: None,
        }
    }

    /// Production wiring: SQLite store, process invoker, configured classifier
    pub fn from_config(config: &DriverConfig) -> DriverResult<Self> {
        let database = config.storage.database_path();
        let store = SqliteSecretStore::open(&database)?;
        debug!(database = %database.display(), "secret store ready");

        let invoker = ProcessInvoker::from_config(&config.tool);
        let classifier = ResponseClassifier::from_config(config)?;

        Ok(Self::new(Arc::new(invoker), Arc::new(store))
            .with_classifier(classifier)
            .with_passphrases(KeychainTokenManager::new(
                config.keychain.passphrase_env.clone(),
            ))
            .with_timeout(config.tool.timeout())
            .with_extra_env(config.tool.extra_env.clone()))
    }

    pub fn with_classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_passphrases(mut self, passphrases: KeychainTokenManager) -> Self {
        self.passphrases = passphrases;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_extra_env(mut self, env: HashMap<String, String>) -> Self {
        self.extra_env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn runner(&self) -> &dyn ToolRunner {
        self.runner.as_ref()
    }

    pub fn secrets(&self) -> &dyn SecretProvider {
        self.secrets.as_ref()
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a validated invocation authorized with the account's passphrase
    pub fn invocation(&self, account: &str, command: ToolCommand) -> DriverResult<ToolInvocation> {
        let account = account.trim();
        if account.is_empty() {
            return Err(DriverError::EmptyAccount);
        }
        command.validate()?;

        let secret = self.secrets.get_or_create_secret(account)?;
        let passphrase = self.passphrases.resolve(SecretString::new(secret.into()));

        let mut invocation =
            ToolInvocation::new(command, passphrase, self.timeout).with_env(self.extra_env.clone());
        if let Some(dir) = &self.working_dir {
            invocation = invocation.with_working_dir(dir.clone());
        }
        Ok(invocation)
    }
}
