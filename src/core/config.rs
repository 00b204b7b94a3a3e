//! Configuration structures and types for ipa-buyer
//!
//! This module provides type-safe configuration management with serde support.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default absolute timeout for a single tool invocation
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default environment variable that overrides the keychain passphrase
pub const DEFAULT_PASSPHRASE_ENV: &str = "IPATOOL_KEYCHAIN_PASSPHRASE";

/// Default number of results requested by `search`
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// Default bound for raw tool text surfaced to users
pub const DEFAULT_PREVIEW_LENGTH: usize = 200;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverConfig {
    /// External tool location and execution limits
    pub tool: ToolConfig,

    /// Keychain passphrase handling
    pub keychain: KeychainConfig,

    /// Local persistence
    pub storage: StorageConfig,

    /// Search defaults
    pub search: SearchConfig,

    /// Response classification extensions
    pub classifier: ClassifierConfig,

    /// User-facing message settings
    pub messages: MessagesConfig,
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolConfig {
    /// Explicit executable path; skips resolution when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Directory searched for a bundled executable (default: directory of the running binary)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    /// Absolute timeout per invocation, in seconds
    pub timeout_secs: u64,

    /// Stale lock file removed around logout (default: ~/.ipatool/.lock)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,

    /// Additional environment variables for every invocation
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extra_env: HashMap<String, String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: None,
            install_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            lock_file: None,
            extra_env: HashMap::new(),
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Lock file path, falling back to the tool's home directory location
    pub fn lock_file_path(&self) -> Option<PathBuf> {
        self.lock_file
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ipatool").join(".lock")))
    }
}

/// Keychain passphrase configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct KeychainConfig {
    /// Name of the environment variable overriding the per-account secret
    pub passphrase_env: String,
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self {
            passphrase_env: DEFAULT_PASSPHRASE_ENV.to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Directory holding the account database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Database file name inside the data directory
    pub const DATABASE_FILE: &'static str = "KeychainConfig.db";

    pub fn database_path(&self) -> PathBuf {
        let dir = self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("ipa-buyer")
        });
        dir.join(Self::DATABASE_FILE)
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    pub default_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Classifier extensions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    /// Outcome name (e.g. "networkError") to additional keywords
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extra_keywords: HashMap<String, Vec<String>>,
}

/// User-facing message configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagesConfig {
    pub preview_length: usize,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            preview_length: DEFAULT_PREVIEW_LENGTH,
        }
    }
}
