//! Keychain passphrase resolution and secret masking
//!
//! Passphrases and passwords travel as `secrecy::SecretString` so they never
//! end up in `Debug` output, and anything that must be logged goes through
//! the masking helpers here first.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Masks a token for safe logging
///
/// Shows only the first 3 and last 3 characters for identification purposes.
/// Tokens shorter than 10 characters are fully masked as "****".
///
/// # Examples
///
/// ```
/// use ipa_buyer::security::token_manager::mask_token;
///
/// assert_eq!(mask_token("abcdef123456"), "abc...456");
/// assert_eq!(mask_token("short"), "****");
/// ```
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }

    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

/// Masks every occurrence of the given secrets in a string
///
/// Used before tool output (which may echo arguments) is logged.
pub fn mask_secrets_in_string(text: &str, secrets: &[&SecretString]) -> String {
    let mut masked = text.to_string();

    for secret in secrets {
        let value = secret.expose_secret();
        if value.is_empty() {
            continue;
        }
        if let Ok(regex) = Regex::new(&regex::escape(value)) {
            let replacement = mask_token(value);
            masked = regex
                .replace_all(&masked, regex::NoExpand(&replacement))
                .to_string();
        }
    }

    masked
}

/// Resolves the keychain passphrase for an invocation
///
/// An override environment variable, when set and non-empty, takes
/// precedence over the generated per-account secret.
#[derive(Debug, Clone)]
pub struct KeychainTokenManager {
    passphrase_env: String,
    env: HashMap<String, String>,
}

impl KeychainTokenManager {
    /// Creates a manager reading the override from the process environment
    pub fn new(passphrase_env: impl Into<String>) -> Self {
        Self::with_env(passphrase_env, std::env::vars().collect())
    }

    /// Creates a manager reading the override from an explicit environment map
    pub fn with_env(passphrase_env: impl Into<String>, env: HashMap<String, String>) -> Self {
        Self {
            passphrase_env: passphrase_env.into(),
            env,
        }
    }

    /// Name of the override environment variable
    pub fn passphrase_env(&self) -> &str {
        &self.passphrase_env
    }

    /// Returns the override passphrase, if configured
    pub fn override_passphrase(&self) -> Option<SecretString> {
        if self.passphrase_env.trim().is_empty() {
            return None;
        }
        self.env
            .get(&self.passphrase_env)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(|value| SecretString::new(value.to_string().into()))
    }

    /// Picks the override when present, else the account secret
    pub fn resolve(&self, account_secret: SecretString) -> SecretString {
        self.override_passphrase().unwrap_or(account_secret)
    }
}
