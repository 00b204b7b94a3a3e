//! Core traits and types shared by the invoker, the classifier and the services
//!
//! The process invoker and the secret store sit behind traits so the login
//! flow can be driven against scripted tool responses in tests.

use crate::core::error::DriverResult;
use crate::process::cancel::{CancellationToken, StopReason};
use crate::process::command::ToolInvocation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Command Result
// ============================================================================

/// Outcome of one external tool invocation
///
/// When `timed_out` is true the exit code carries no meaning and the process
/// tree has already been terminated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Captured standard output (None when the process never started or was killed)
    pub stdout: Option<String>,
    /// Captured standard error
    pub stderr: Option<String>,
    /// Process exit code, -1 when unavailable
    pub exit_code: i32,
    /// Deadline elapsed or caller cancelled; the process was killed
    pub timed_out: bool,
    /// Which source stopped the process, when `timed_out` is set
    #[serde(skip)]
    pub stop_reason: Option<StopReason>,
    /// Spawn failure description (binary missing or not executable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_error: Option<String>,
    /// Wall-clock duration of the invocation
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl CommandResult {
    /// Result for a process that finished on its own
    pub fn completed(stdout: String, stderr: String, exit_code: i32, elapsed: Duration) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code,
            timed_out: false,
            stop_reason: None,
            launch_error: None,
            elapsed,
        }
    }

    /// Result for a process killed by timeout or cancellation; output is discarded
    pub fn stopped(reason: StopReason, elapsed: Duration) -> Self {
        Self {
            stdout: None,
            stderr: None,
            exit_code: -1,
            timed_out: true,
            stop_reason: Some(reason),
            launch_error: None,
            elapsed,
        }
    }

    /// Result for a process that could not be spawned
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self {
            stdout: None,
            stderr: None,
            exit_code: -1,
            timed_out: false,
            stop_reason: None,
            launch_error: Some(message.into()),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_launch_failure(&self) -> bool {
        self.launch_error.is_some()
    }

    pub fn was_cancelled(&self) -> bool {
        self.stop_reason == Some(StopReason::Cancelled)
    }

    /// Exit code 0 from a process that was not killed
    pub fn exited_cleanly(&self) -> bool {
        !self.timed_out && !self.is_launch_failure() && self.exit_code == 0
    }

    /// Standard output when it has content, otherwise standard error
    ///
    /// The tool writes its JSON answer to stdout and diagnostics to stderr,
    /// but some failures only ever reach stderr.
    pub fn output_or_error(&self) -> Option<&str> {
        let stdout = self.stdout.as_deref().filter(|s| !s.trim().is_empty());
        let stderr = self.stderr.as_deref().filter(|s| !s.trim().is_empty());
        stdout.or(stderr).or(self.launch_error.as_deref())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

// ============================================================================
// Tool Runner Trait
// ============================================================================

/// Runs one external tool invocation to completion, timeout or cancellation
///
/// Implementations never return an error for failures the tool reports:
/// everything is captured in the `CommandResult`.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: ToolInvocation, cancel: CancellationToken) -> CommandResult;
}

// ============================================================================
// Secret Provider Trait
// ============================================================================

/// Source of per-account keychain passphrases
pub trait SecretProvider: Send + Sync {
    /// Existing secret for `account`, or a newly generated and persisted one
    fn get_or_create_secret(&self, account: &str) -> DriverResult<String>;

    /// Account most recently used, for session prefill
    fn last_login_account(&self) -> DriverResult<Option<String>>;

    fn set_last_login_account(&self, account: &str) -> DriverResult<()>;

    fn clear_last_login_account(&self) -> DriverResult<()>;
}
