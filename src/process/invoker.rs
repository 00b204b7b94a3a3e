//! ProcessInvoker: bounded, cancellable execution of the external tool
//!
//! Each invocation is an independent OS process. Both output streams are
//! drained by their own task from the moment the child starts, and the exit
//! wait races a single stop signal derived from the caller's token and the
//! invocation deadline. Whichever source fires, the whole process group is
//! killed and the partial output is dropped.

use crate::classify::extract::extract_payload;
use crate::core::config::ToolConfig;
use crate::core::error::DriverError;
use crate::core::traits::{CommandResult, ToolRunner};
use crate::process::cancel::{CancellationToken, StopReason, stop_signal};
use crate::process::command::ToolInvocation;
use crate::process::locator::ToolLocator;
use crate::process::lock_file::remove_stale_lock;
use crate::security::token_manager::mask_secrets_in_string;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const MAX_TEXT_FILE_BUSY_RETRIES: u32 = 5;
const TEXT_FILE_BUSY_ERRNO: i32 = 26;

/// Production `ToolRunner`
#[derive(Debug)]
pub struct ProcessInvoker {
    locator: Arc<ToolLocator>,
    lock_file: Option<PathBuf>,
}

enum Finished {
    Exited(std::io::Result<ExitStatus>),
    Stopped(StopReason),
}

impl ProcessInvoker {
    pub fn new(locator: Arc<ToolLocator>) -> Self {
        Self {
            locator,
            lock_file: None,
        }
    }

    /// Invoker wired from the `tool` configuration section
    pub fn from_config(config: &ToolConfig) -> Self {
        let locator = match &config.install_dir {
            Some(dir) => ToolLocator::new(dir.clone()),
            None => ToolLocator::for_current_exe(),
        }
        .with_configured_path(config.path.clone());

        Self::new(Arc::new(locator)).with_lock_file(config.lock_file_path())
    }

    /// Lock file removed around logout-class commands
    pub fn with_lock_file(mut self, path: Option<PathBuf>) -> Self {
        self.lock_file = path;
        self
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    fn cleanup_lock(&self) {
        if let Some(path) = &self.lock_file {
            remove_stale_lock(path);
        }
    }

    /// Run `invocation` against an explicit executable
    pub async fn run_at(
        &self,
        executable: &Path,
        invocation: &ToolInvocation,
        cancel: &CancellationToken,
    ) -> CommandResult {
        let invocation_id = Uuid::new_v4();
        let span = info_span!(
            "tool_invocation",
            %invocation_id,
            command = invocation.command.name()
        );

        async {
            if let Err(err) = invocation.command.validate() {
                warn!(error = %err, "rejected invocation before spawn");
                return CommandResult::launch_failed(err.to_string());
            }

            let logout = invocation.command.is_logout();
            if logout {
                self.cleanup_lock();
            }

            let result = execute(executable, invocation, cancel).await;

            if logout {
                self.cleanup_lock();
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl ToolRunner for ProcessInvoker {
    async fn run(&self, invocation: ToolInvocation, cancel: CancellationToken) -> CommandResult {
        let executable = self.locator.resolve().path.clone();
        self.run_at(&executable, &invocation, &cancel).await
    }
}

async fn execute(
    executable: &Path,
    invocation: &ToolInvocation,
    cancel: &CancellationToken,
) -> CommandResult {
    let started = Instant::now();
    debug!(
        executable = %executable.display(),
        args = ?invocation.masked_args(),
        timeout_ms = invocation.timeout.as_millis() as u64,
        "launching tool"
    );

    let mut command = Command::new(executable);
    command
        .args(invocation.args())
        .envs(invocation.environment())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.working_dir {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    command.process_group(0);
    #[cfg(windows)]
    command.creation_flags(CREATE_NO_WINDOW);

    let mut child = match spawn_with_text_file_busy_retry(&mut command).await {
        Ok(child) => child,
        Err(err) => {
            let error = DriverError::ProcessLaunchFailure {
                path: executable.to_path_buf(),
                message: err.to_string(),
            };
            warn!(error = %error, "failed to launch tool");
            return CommandResult::launch_failed(error.to_string());
        }
    };
    let pid = child.id();
    debug!(pid, "tool process started");

    let stdout_task = tokio::spawn(read_lossy(child.stdout.take()).in_current_span());
    let stderr_task = tokio::spawn(read_lossy(child.stderr.take()).in_current_span());

    let finished = tokio::select! {
        status = child.wait() => Finished::Exited(status),
        reason = stop_signal(cancel, invocation.timeout) => Finished::Stopped(reason),
    };

    let exit_code = match finished {
        Finished::Stopped(reason) => {
            return stop(&mut child, pid, reason, started, [stdout_task, stderr_task]).await;
        }
        Finished::Exited(Ok(status)) => status.code().unwrap_or(-1),
        Finished::Exited(Err(err)) => {
            warn!(error = %err, "waiting for tool process failed");
            -1
        }
    };

    // A descendant can keep the pipes open after the child exits.
    let remaining = invocation.timeout.saturating_sub(started.elapsed());
    let drained = tokio::select! {
        outputs = async { tokio::join!(stdout_task, stderr_task) } => Ok(outputs),
        reason = stop_signal(cancel, remaining) => Err(reason),
    };
    let (stdout, stderr) = match drained {
        Ok((stdout, stderr)) => (stdout.unwrap_or_default(), stderr.unwrap_or_default()),
        Err(reason) => return stop(&mut child, pid, reason, started, []).await,
    };

    let elapsed = started.elapsed();
    info!(
        exit_code,
        elapsed_ms = elapsed.as_millis() as u64,
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "tool process exited"
    );

    if !stdout.trim().is_empty() && extract_payload(&stdout).is_none() {
        debug!(
            stdout = %mask_secrets_in_string(&stdout, &invocation.sensitive_values()),
            "tool output contained no JSON"
        );
    }
    if !stderr.trim().is_empty() {
        debug!(
            stderr = %mask_secrets_in_string(&stderr, &invocation.sensitive_values()),
            "tool diagnostics"
        );
    }

    CommandResult::completed(stdout, stderr, exit_code, elapsed)
}

async fn stop<const N: usize>(
    child: &mut Child,
    pid: Option<u32>,
    reason: StopReason,
    started: Instant,
    readers: [JoinHandle<String>; N],
) -> CommandResult {
    warn!(
        ?reason,
        pid,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stopping tool process tree"
    );
    kill_process_tree(child, pid).await;
    for reader in readers {
        reader.abort();
    }
    CommandResult::stopped(reason, started.elapsed())
}

async fn spawn_with_text_file_busy_retry(command: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(err)
                if err.raw_os_error() == Some(TEXT_FILE_BUSY_ERRNO)
                    && attempt < MAX_TEXT_FILE_BUSY_RETRIES =>
            {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn read_lossy<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buffer = Vec::new();
    if let Err(err) = stream.read_to_end(&mut buffer).await {
        debug!(error = %err, "output stream closed early");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Kill the child and every process in its group, then reap the child
async fn kill_process_tree(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_group(pid).await;
    }
    if let Err(err) = child.kill().await {
        debug!(error = %err, "child already gone");
    }
}

#[cfg(unix)]
async fn kill_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %err, "process group kill failed");
    }
}

#[cfg(windows)]
async fn kill_group(pid: u32) {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()
        .await;
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => debug!(pid, ?status, "taskkill reported failure"),
        Err(err) => debug!(pid, error = %err, "taskkill could not be started"),
    }
}

#[cfg(not(any(unix, windows)))]
async fn kill_group(_pid: u32) {}
