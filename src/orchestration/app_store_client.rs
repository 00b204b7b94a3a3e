//! AppStoreClient: the surface consumers drive
//!
//! Login goes through the state machine; search, purchase, account info and
//! logout are single tool calls that hand back the raw `CommandResult`
//! alongside helpers to interpret it.

use super::context::DriverContext;
use super::login_service::{LoginResult, LoginService};
use crate::classify::classifier::{ClassifiedOutcome, is_purchase_success};
use crate::classify::search::{SearchResults, parse_search_apps};
use crate::core::config::{DEFAULT_SEARCH_LIMIT, DriverConfig};
use crate::core::error::DriverResult;
use crate::core::session::SessionState;
use crate::core::state_machine::AuthState;
use crate::core::traits::CommandResult;
use crate::process::cancel::CancellationToken;
use crate::process::command::ToolCommand;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

/// Search call result with its parsed app list
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub result: CommandResult,
    /// None when the output had no `apps` array
    pub apps: Option<SearchResults>,
}

#[derive(Debug)]
pub struct AppStoreClient {
    context: Arc<DriverContext>,
    login: LoginService,
    search_limit: u32,
}

impl AppStoreClient {
    pub fn new(context: Arc<DriverContext>) -> Self {
        Self {
            login: LoginService::new(context.clone()),
            context,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Fully wired client for a loaded configuration
    pub fn from_config(config: &DriverConfig) -> DriverResult<Self> {
        let context = DriverContext::from_config(config)?;
        Ok(Self::new(Arc::new(context)).with_search_limit(config.search.default_limit))
    }

    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn context(&self) -> &DriverContext {
        &self.context
    }

    pub fn session(&self) -> &SessionState {
        self.context.session()
    }

    pub fn auth_state(&self) -> AuthState {
        self.login.state()
    }

    pub async fn login(
        &self,
        account: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> LoginResult {
        self.login.login(account, password, cancel).await
    }

    pub async fn verify_two_factor(
        &self,
        account: &str,
        password: &SecretString,
        code: &str,
        cancel: &CancellationToken,
    ) -> LoginResult {
        self.login
            .verify_two_factor(account, password, code, cancel)
            .await
    }

    async fn run(
        &self,
        account: &str,
        command: ToolCommand,
        cancel: &CancellationToken,
    ) -> DriverResult<CommandResult> {
        let invocation = self.context.invocation(account, command)?;
        Ok(self.context.runner().run(invocation, cancel.clone()).await)
    }

    /// Search the store; `limit` falls back to the configured default
    pub async fn search(
        &self,
        account: &str,
        term: &str,
        limit: Option<u32>,
        cancel: &CancellationToken,
    ) -> DriverResult<SearchOutcome> {
        let command = ToolCommand::Search {
            term: term.to_string(),
            limit: limit.unwrap_or(self.search_limit),
        };
        let result = self.run(account, command, cancel).await?;
        let apps = result.stdout.as_deref().and_then(parse_search_apps);
        Ok(SearchOutcome { result, apps })
    }

    pub async fn purchase(
        &self,
        account: &str,
        bundle_id: &str,
        cancel: &CancellationToken,
    ) -> DriverResult<CommandResult> {
        let command = ToolCommand::Purchase {
            bundle_id: bundle_id.to_string(),
        };
        let result = self.run(account, command, cancel).await?;
        info!(bundle_id, succeeded = purchase_succeeded(&result), "purchase finished");
        Ok(result)
    }

    pub async fn auth_info(
        &self,
        account: &str,
        cancel: &CancellationToken,
    ) -> DriverResult<CommandResult> {
        self.run(account, ToolCommand::AuthInfo, cancel).await
    }

    /// Revoke the tool's stored credentials and mark the session signed out
    ///
    /// The last-login marker stays so the account can be prefilled.
    pub async fn logout(
        &self,
        account: &str,
        cancel: &CancellationToken,
    ) -> DriverResult<CommandResult> {
        let result = self.run(account, ToolCommand::AuthRevoke, cancel).await?;
        self.context.session().reset();
        info!(exit_code = result.exit_code, "logged out");
        Ok(result)
    }

    /// Drop the remembered account so nothing is prefilled next time
    pub fn forget_account(&self) -> DriverResult<()> {
        self.context.session().forget()
    }

    pub fn get_or_create_secret(&self, account: &str) -> DriverResult<String> {
        self.context.secrets().get_or_create_secret(account)
    }

    /// Account and signed-in flag from the session
    pub fn whoami(&self) -> (Option<String>, bool) {
        self.context.session().snapshot()
    }

    /// Classify a non-login result for display
    pub fn classify(&self, result: &CommandResult) -> Option<ClassifiedOutcome> {
        result
            .output_or_error()
            .map(|output| self.context.classifier().interpret(output, false))
    }
}

/// Purchase verdict for a finished call
pub fn purchase_succeeded(result: &CommandResult) -> bool {
    result.exited_cleanly() && result.output_or_error().is_some_and(is_purchase_success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::rules::OutcomeKind;
    use crate::core::traits::ToolRunner;
    use crate::process::command::ToolInvocation;
    use crate::security::secret_store::SqliteSecretStore;
    use crate::security::token_manager::KeychainTokenManager;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct EchoRunner {
        stdout: String,
        exit_code: i32,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ToolRunner for EchoRunner {
        async fn run(&self, invocation: ToolInvocation, _cancel: CancellationToken) -> CommandResult {
            self.calls.lock().unwrap().push(invocation.args());
            CommandResult::completed(self.stdout.clone(), String::new(), self.exit_code, Duration::ZERO)
        }
    }

    fn build_client(stdout: &str, exit_code: i32) -> (AppStoreClient, Arc<EchoRunner>) {
        let runner = Arc::new(EchoRunner {
            stdout: stdout.to_string(),
            exit_code,
            calls: Mutex::new(Vec::new()),
        });
        let store = Arc::new(SqliteSecretStore::open_in_memory().unwrap());
        let context = DriverContext::new(runner.clone(), store)
            .with_passphrases(KeychainTokenManager::with_env("UNSET", HashMap::new()));
        (AppStoreClient::new(Arc::new(context)).with_search_limit(3), runner)
    }

    #[tokio::test]
    async fn test_search_uses_default_limit_and_parses_apps() {
        let (client, runner) = build_client(
            r#"{"count":1,"apps":[{"bundleID":"com.example.notes","id":42,"name":"Notes","price":0,"version":"3.0"}]}"#,
            0,
        );
        let outcome = client
            .search("user@example.com", "notes", None, &CancellationToken::new())
            .await
            .unwrap();

        let apps = outcome.apps.unwrap();
        assert_eq!(apps.apps[0].bundle_id, "com.example.notes");
        let args = &runner.calls.lock().unwrap()[0];
        assert_eq!(&args[..4], &["search", "notes", "--limit", "3"]);
    }

    #[tokio::test]
    async fn test_search_rejects_blank_term() {
        let (client, runner) = build_client("{}", 0);
        let err = client
            .search("user@example.com", "  ", Some(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_verdict() {
        let (client, runner) = build_client("INF purchasing\n{\"success\":true}", 0);
        let result = client
            .purchase("user@example.com", "com.example.notes", &CancellationToken::new())
            .await
            .unwrap();
        assert!(purchase_succeeded(&result));
        assert_eq!(
            &runner.calls.lock().unwrap()[0][..3],
            &["purchase", "--bundle-identifier", "com.example.notes"]
        );

        let (client, _runner) = build_client(r#"{"success":false,"error":"license required"}"#, 1);
        let result = client
            .purchase("user@example.com", "com.example.paid", &CancellationToken::new())
            .await
            .unwrap();
        assert!(!purchase_succeeded(&result));
        assert_eq!(client.classify(&result).unwrap().kind(), OutcomeKind::UnknownError);
    }

    #[tokio::test]
    async fn test_logout_resets_session_but_keeps_account() {
        let (client, runner) = build_client(r#"{"success":true}"#, 0);
        client
            .session()
            .set_login_state("user@example.com", true)
            .unwrap();

        client
            .logout("user@example.com", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(client.whoami(), (Some("user@example.com".to_string()), false));
        assert_eq!(&runner.calls.lock().unwrap()[0][..2], &["auth", "revoke"]);
        assert_eq!(
            client.context().secrets().last_login_account().unwrap(),
            Some("user@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_forget_account_after_logout() {
        let (client, _runner) = build_client(r#"{"success":true}"#, 0);
        client
            .session()
            .set_login_state("user@example.com", true)
            .unwrap();
        client
            .logout("user@example.com", &CancellationToken::new())
            .await
            .unwrap();

        client.forget_account().unwrap();
        assert_eq!(client.whoami(), (None, false));
        assert_eq!(client.context().secrets().last_login_account().unwrap(), None);
    }

    #[tokio::test]
    async fn test_auth_info_and_secret_share_passphrase() {
        let (client, runner) = build_client(r#"{"success":true,"email":"user@example.com"}"#, 0);
        let result = client
            .auth_info("user@example.com", &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.exited_cleanly());

        let secret = client.get_or_create_secret("user@example.com").unwrap();
        let args = &runner.calls.lock().unwrap()[0];
        assert_eq!(&args[..2], &["auth", "info"]);
        assert_eq!(args[3], secret);
    }

    #[tokio::test]
    async fn test_login_delegates_to_state_machine() {
        let (client, _runner) = build_client(r#"{"success":true}"#, 0);
        let result = client
            .login(
                "user@example.com",
                &SecretString::new("pw".to_string().into()),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_success());
        assert_eq!(client.auth_state(), AuthState::Authenticated);
        assert_eq!(client.whoami(), (Some("user@example.com".to_string()), true));
    }
}
