//! LoginService: credential login and two-factor verification
//!
//! Both calls run `auth login`; the first sends a placeholder code because
//! none has been collected yet. Every failure, including errors raised
//! before the tool runs, comes back as a `LoginResult` with a localized
//! message, so callers only ever handle one shape.

use super::context::DriverContext;
use crate::classify::classifier::truncate_preview;
use crate::classify::rules::OutcomeKind;
use crate::core::error::{DriverError, DriverResult};
use crate::core::state_machine::{AuthState, AuthStateMachine, AuthTransition};
use crate::core::traits::CommandResult;
use crate::process::cancel::CancellationToken;
use crate::process::command::{PLACEHOLDER_AUTH_CODE, ToolCommand};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const MSG_SUCCESS: &str = "登录成功。";
const MSG_REQUIRES_TWO_FACTOR: &str = "需要输入两步验证码。";
const MSG_INVALID_CREDENTIAL: &str = "用户名或密码不正确。";
const MSG_AUTH_CODE_INVALID: &str = "验证码错误，请重新输入。";
const MSG_NETWORK_ERROR: &str = "网络异常，请稍后重试。";
const MSG_TIMEOUT: &str = "登录请求超时，请稍后重试。";
const MSG_CANCELLED: &str = "登录已取消。";
const MSG_EMPTY_RESPONSE: &str = "未收到登录响应，请稍后重试。";
const MSG_UNKNOWN: &str = "登录失败，请稍后重试。";

/// Final status of one login or verification call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoginStatus {
    Success,
    RequiresTwoFactor,
    InvalidCredential,
    AuthCodeInvalid,
    NetworkError,
    Timeout,
    UnknownError,
}

impl From<OutcomeKind> for LoginStatus {
    fn from(kind: OutcomeKind) -> Self {
        match kind {
            OutcomeKind::Success => LoginStatus::Success,
            OutcomeKind::RequiresTwoFactor => LoginStatus::RequiresTwoFactor,
            OutcomeKind::InvalidCredential => LoginStatus::InvalidCredential,
            OutcomeKind::AuthCodeInvalid => LoginStatus::AuthCodeInvalid,
            OutcomeKind::NetworkError => LoginStatus::NetworkError,
            OutcomeKind::Timeout => LoginStatus::Timeout,
            OutcomeKind::UnknownError => LoginStatus::UnknownError,
        }
    }
}

impl From<LoginStatus> for OutcomeKind {
    fn from(status: LoginStatus) -> Self {
        match status {
            LoginStatus::Success => OutcomeKind::Success,
            LoginStatus::RequiresTwoFactor => OutcomeKind::RequiresTwoFactor,
            LoginStatus::InvalidCredential => OutcomeKind::InvalidCredential,
            LoginStatus::AuthCodeInvalid => OutcomeKind::AuthCodeInvalid,
            LoginStatus::NetworkError => OutcomeKind::NetworkError,
            LoginStatus::Timeout => OutcomeKind::Timeout,
            LoginStatus::UnknownError => OutcomeKind::UnknownError,
        }
    }
}

impl LoginStatus {
    /// Fixed user-facing message; `UnknownError` normally carries the tool's own
    pub fn default_message(self) -> &'static str {
        match self {
            LoginStatus::Success => MSG_SUCCESS,
            LoginStatus::RequiresTwoFactor => MSG_REQUIRES_TWO_FACTOR,
            LoginStatus::InvalidCredential => MSG_INVALID_CREDENTIAL,
            LoginStatus::AuthCodeInvalid => MSG_AUTH_CODE_INVALID,
            LoginStatus::NetworkError => MSG_NETWORK_ERROR,
            LoginStatus::Timeout => MSG_TIMEOUT,
            LoginStatus::UnknownError => MSG_UNKNOWN,
        }
    }
}

/// Outcome returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    pub status: LoginStatus,
    pub message: String,
    /// Tool output the status was derived from, for diagnostics only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
}

impl LoginResult {
    pub fn new(status: LoginStatus, message: impl Into<String>, raw_payload: Option<String>) -> Self {
        Self {
            status,
            message: message.into(),
            raw_payload,
        }
    }

    fn with_default_message(status: LoginStatus, raw_payload: Option<String>) -> Self {
        Self::new(status, status.default_message(), raw_payload)
    }

    pub fn is_success(&self) -> bool {
        self.status == LoginStatus::Success
    }

    pub fn requires_two_factor(&self) -> bool {
        self.status == LoginStatus::RequiresTwoFactor
    }

    pub fn is_timeout(&self) -> bool {
        self.status == LoginStatus::Timeout
    }
}

/// Drives the authentication state machine through the external tool
pub struct LoginService {
    context: Arc<DriverContext>,
    machine: Mutex<AuthStateMachine>,
}

impl std::fmt::Debug for LoginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginService")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LoginService {
    pub fn new(context: Arc<DriverContext>) -> Self {
        Self {
            context,
            machine: Mutex::new(AuthStateMachine::new()),
        }
    }

    fn machine(&self) -> MutexGuard<'_, AuthStateMachine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state of the flow
    pub fn state(&self) -> AuthState {
        self.machine().state()
    }

    pub fn history(&self) -> Vec<AuthTransition> {
        self.machine().history().to_vec()
    }

    /// First login attempt with a placeholder one-time code
    pub async fn login(
        &self,
        account: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> LoginResult {
        {
            let mut machine = self.machine();
            machine.reset();
            self.advance(&mut machine, AuthState::AwaitingResponse);
        }
        self.execute(account, password, PLACEHOLDER_AUTH_CODE, cancel, false)
            .await
    }

    /// Repeat the login with the code the user supplied
    pub async fn verify_two_factor(
        &self,
        account: &str,
        password: &SecretString,
        code: &str,
        cancel: &CancellationToken,
    ) -> LoginResult {
        {
            let mut machine = self.machine();
            machine.resume_two_factor();
            self.advance(&mut machine, AuthState::AwaitingCodeResponse);
        }
        self.execute(account, password, code, cancel, true).await
    }

    fn advance(&self, machine: &mut AuthStateMachine, to: AuthState) {
        if let Err(err) = machine.transition(to, None) {
            debug!(error = %err, "auth state not advanced");
        }
    }

    async fn execute(
        &self,
        account: &str,
        password: &SecretString,
        code: &str,
        cancel: &CancellationToken,
        is_two_factor: bool,
    ) -> LoginResult {
        let result = match self
            .attempt(account, password, code, cancel, is_two_factor)
            .await
        {
            Ok(result) => result,
            Err(DriverError::Cancelled) => LoginResult::new(LoginStatus::UnknownError, MSG_CANCELLED, None),
            Err(err) => {
                warn!(error = %err, code = err.code(), "login attempt failed before classification");
                LoginResult::new(LoginStatus::UnknownError, format!("登录失败: {}", err), None)
            }
        };

        info!(status = ?result.status, is_two_factor, "login attempt finished");
        let mut machine = self.machine();
        if let Err(err) = machine.complete(result.status.into()) {
            debug!(error = %err, "auth state not completed");
        }
        debug!(
            state = %machine.state(),
            elapsed_ms = machine.elapsed_ms(),
            history = %machine.history_text(),
            "auth flow"
        );
        result
    }

    async fn attempt(
        &self,
        account: &str,
        password: &SecretString,
        code: &str,
        cancel: &CancellationToken,
        is_two_factor: bool,
    ) -> DriverResult<LoginResult> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }

        let account = account.trim();
        let command = ToolCommand::AuthLogin {
            email: account.to_string(),
            password: password.clone(),
            auth_code: code.to_string(),
        };
        let invocation = self.context.invocation(account, command)?;
        let response = self.context.runner().run(invocation, cancel.clone()).await;

        let result = self.interpret(&response, is_two_factor)?;
        if result.is_success() {
            self.context.secrets().get_or_create_secret(account)?;
            self.context.session().set_login_state(account, true)?;
        }
        Ok(result)
    }

    fn interpret(&self, response: &CommandResult, is_two_factor: bool) -> DriverResult<LoginResult> {
        if response.was_cancelled() {
            return Err(DriverError::Cancelled);
        }
        if response.timed_out {
            return Ok(LoginResult::with_default_message(LoginStatus::Timeout, None));
        }
        if let Some(launch_error) = &response.launch_error {
            return Ok(LoginResult::new(
                LoginStatus::UnknownError,
                format!("登录失败: {}", launch_error),
                None,
            ));
        }

        let payload = response.output_or_error().unwrap_or_default();
        if payload.trim().is_empty() {
            return Ok(LoginResult::new(
                LoginStatus::UnknownError,
                MSG_EMPTY_RESPONSE,
                Some(payload.to_string()),
            ));
        }

        let classifier = self.context.classifier();
        let outcome = classifier.interpret(payload, is_two_factor);
        let status = LoginStatus::from(outcome.kind());

        if status == LoginStatus::Success && response.exit_code != 0 {
            warn!(exit_code = response.exit_code, "success payload with non-zero exit code");
            return Ok(LoginResult::new(
                LoginStatus::UnknownError,
                format!("登录失败: 退出码 {}", response.exit_code),
                Some(outcome.raw_payload().to_string()),
            ));
        }

        let raw_payload = Some(outcome.raw_payload().to_string());
        if status != LoginStatus::UnknownError {
            return Ok(LoginResult::with_default_message(status, raw_payload));
        }

        let message = if outcome.message().trim().is_empty() {
            MSG_UNKNOWN.to_string()
        } else {
            truncate_preview(outcome.message(), classifier.preview_length())
        };
        Ok(LoginResult::new(status, message, raw_payload))
    }
}
