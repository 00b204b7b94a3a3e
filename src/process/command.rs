//! Argument construction for the external App Store tool
//!
//! Arguments are produced as discrete argv entries; nothing is ever joined
//! into a shell string, so passwords and search terms need no quoting.

use crate::core::error::{DriverError, DriverResult};
use crate::security::token_manager::mask_token;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// One-time code sent with the first login attempt, before any code was collected
pub const PLACEHOLDER_AUTH_CODE: &str = "000000";

/// Environment injected into every invocation to keep captured text plain
pub const PLAIN_OUTPUT_ENV: &[(&str, &str)] = &[("NO_COLOR", "1"), ("TERM", "dumb")];

/// Subcommands understood by the external tool
#[derive(Debug, Clone)]
pub enum ToolCommand {
    AuthLogin {
        email: String,
        password: SecretString,
        auth_code: String,
    },
    AuthRevoke,
    AuthInfo,
    Search {
        term: String,
        limit: u32,
    },
    Purchase {
        bundle_id: String,
    },
}

impl ToolCommand {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthLogin { .. } => "auth login",
            Self::AuthRevoke => "auth revoke",
            Self::AuthInfo => "auth info",
            Self::Search { .. } => "search",
            Self::Purchase { .. } => "purchase",
        }
    }

    /// Logout-class commands trigger stale lock cleanup around the invocation
    pub fn is_logout(&self) -> bool {
        matches!(self, Self::AuthRevoke)
    }

    /// Reject inputs the tool would misinterpret, before anything is spawned
    pub fn validate(&self) -> DriverResult<()> {
        match self {
            Self::AuthLogin {
                email, auth_code, ..
            } => {
                if email.trim().is_empty() {
                    return Err(DriverError::invalid("email", "不能为空"));
                }
                if auth_code.trim().is_empty() {
                    return Err(DriverError::invalid("auth_code", "不能为空"));
                }
            }
            Self::Search { term, limit } => {
                if term.trim().is_empty() {
                    return Err(DriverError::invalid("term", "不能为空"));
                }
                if *limit == 0 {
                    return Err(DriverError::invalid("limit", "必须大于 0"));
                }
            }
            Self::Purchase { bundle_id } => {
                if bundle_id.trim().is_empty() {
                    return Err(DriverError::invalid("bundle_id", "不能为空"));
                }
            }
            Self::AuthRevoke | Self::AuthInfo => {}
        }
        Ok(())
    }

    fn subcommand_args(&self) -> Vec<String> {
        match self {
            Self::AuthLogin {
                email,
                password,
                auth_code,
            } => vec![
                "auth".to_string(),
                "login".to_string(),
                "--email".to_string(),
                email.trim().to_string(),
                "--password".to_string(),
                password.expose_secret().to_string(),
                "--auth-code".to_string(),
                auth_code.trim().to_string(),
            ],
            Self::AuthRevoke => vec!["auth".to_string(), "revoke".to_string()],
            Self::AuthInfo => vec!["auth".to_string(), "info".to_string()],
            Self::Search { term, limit } => vec![
                "search".to_string(),
                term.clone(),
                "--limit".to_string(),
                limit.to_string(),
            ],
            Self::Purchase { bundle_id } => vec![
                "purchase".to_string(),
                "--bundle-identifier".to_string(),
                bundle_id.trim().to_string(),
            ],
        }
    }
}

/// A single, non-reusable request to run the external tool
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub command: ToolCommand,
    pub passphrase: SecretString,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(command: ToolCommand, passphrase: SecretString, timeout: Duration) -> Self {
        Self {
            command,
            passphrase,
            working_dir: None,
            env: HashMap::new(),
            timeout,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Full argv (excluding the executable), secrets included
    pub fn args(&self) -> Vec<String> {
        let mut args = self.command.subcommand_args();
        args.extend([
            "--keychain-passphrase".to_string(),
            self.passphrase.expose_secret().to_string(),
            "--format".to_string(),
            "json".to_string(),
            "--non-interactive".to_string(),
            "--verbose".to_string(),
        ]);
        args
    }

    /// Argv safe for logging: password and passphrase values masked
    pub fn masked_args(&self) -> Vec<String> {
        let mut args = self.args();
        for i in 1..args.len() {
            if matches!(args[i - 1].as_str(), "--password" | "--keychain-passphrase") {
                args[i] = mask_token(&args[i]);
            }
        }
        args
    }

    /// Secret values that must be masked wherever tool output is logged
    pub fn sensitive_values(&self) -> Vec<&SecretString> {
        let mut values = vec![&self.passphrase];
        if let ToolCommand::AuthLogin { password, .. } = &self.command {
            values.push(password);
        }
        values
    }

    /// Environment for the child: caller overrides, then the plain-output pair
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .env
            .iter()
            .filter(|(key, _)| !PLAIN_OUTPUT_ENV.iter().any(|(k, _)| *k == key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.extend(
            PLAIN_OUTPUT_ENV
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        env
    }
}
