//! Configuration file loader for ipa-buyer
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::classify::rules::OutcomeKind;
use crate::core::error::DriverError;
use regex::Regex;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration file name
const CONFIG_FILENAME: &str = ".ipa-buyer.yaml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

const ENV_TOOL_PATH: &str = "IPA_BUYER_TOOL_PATH";
const ENV_TIMEOUT_SECS: &str = "IPA_BUYER_TIMEOUT_SECS";
const ENV_DATA_DIR: &str = "IPA_BUYER_DATA_DIR";
const ENV_SEARCH_LIMIT: &str = "IPA_BUYER_SEARCH_LIMIT";

/// Explicit overrides, typically from the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub tool_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub data_dir: Option<PathBuf>,
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Home directory for the global config (None skips it)
    pub home_dir: Option<PathBuf>,

    /// Explicit overrides (highest priority)
    pub overrides: ConfigOverrides,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options for the current process: cwd, real home directory and environment
    pub fn from_process(overrides: ConfigOverrides) -> Self {
        Self {
            project_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            home_dir: dirs::home_dir(),
            overrides,
            env: std::env::vars().collect(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "tool.timeoutSecs")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. Explicit overrides
    /// 2. Environment variables
    /// 3. Explicit config file, else project config (./.ipa-buyer.yaml)
    /// 4. Global config (~/.ipa-buyer.yaml)
    /// 5. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<DriverConfig, DriverError> {
        let mut merged = Value::Mapping(Default::default());

        if let Some(home) = &options.home_dir
            && let Some(global) = Self::load_config_file(&home.join(CONFIG_FILENAME)).await?
        {
            Self::merge_into(&mut merged, global);
        }

        let project_file = options
            .overrides
            .config_file
            .clone()
            .unwrap_or_else(|| options.project_path.join(CONFIG_FILENAME));
        match Self::load_config_file(&project_file).await? {
            Some(project) => Self::merge_into(&mut merged, project),
            None if options.overrides.config_file.is_some() => {
                return Err(DriverError::ConfigError(format!(
                    "配置文件不存在: {}",
                    project_file.display()
                )));
            }
            None => {}
        }

        let mut config: DriverConfig = serde_yaml::from_value(merged)
            .map_err(|e| DriverError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        Self::apply_env(&mut config, &options.env)?;
        Self::apply_overrides(&mut config, &options.overrides);
        Self::expand_env_vars(&mut config, &options.env);

        Ok(config)
    }

    /// Load a YAML file as an untyped value so partial files merge field by field
    async fn load_config_file(file_path: &Path) -> Result<Option<Value>, DriverError> {
        if !file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(file_path)
            .await
            .map_err(|e| DriverError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let value: Value = serde_yaml::from_str(&content)
            .map_err(|e| DriverError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        debug!(path = %file_path.display(), "loaded config file");

        match value {
            Value::Null => Ok(None),
            Value::Mapping(_) => Ok(Some(value)),
            _ => Err(DriverError::ConfigError(format!(
                "配置文件顶层必须是映射: {}",
                file_path.display()
            ))),
        }
    }

    /// Deep-merge `source` into `target`; mappings merge, everything else replaces
    fn merge_into(target: &mut Value, source: Value) {
        match (target, source) {
            (Value::Mapping(target_map), Value::Mapping(source_map)) => {
                for (key, value) in source_map {
                    match target_map.get_mut(&key) {
                        Some(existing) => Self::merge_into(existing, value),
                        None => {
                            target_map.insert(key, value);
                        }
                    }
                }
            }
            (target, source) => *target = source,
        }
    }

    /// Apply IPA_BUYER_* environment variables
    fn apply_env(
        config: &mut DriverConfig,
        env: &HashMap<String, String>,
    ) -> Result<(), DriverError> {
        let non_empty = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(path) = non_empty(ENV_TOOL_PATH) {
            config.tool.path = Some(PathBuf::from(path));
        }

        if let Some(raw) = non_empty(ENV_TIMEOUT_SECS) {
            config.tool.timeout_secs = raw.parse().map_err(|_| {
                DriverError::ConfigError(format!("{} must be an integer: {}", ENV_TIMEOUT_SECS, raw))
            })?;
        }

        if let Some(dir) = non_empty(ENV_DATA_DIR) {
            config.storage.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(raw) = non_empty(ENV_SEARCH_LIMIT) {
            config.search.default_limit = raw.parse().map_err(|_| {
                DriverError::ConfigError(format!("{} must be an integer: {}", ENV_SEARCH_LIMIT, raw))
            })?;
        }

        Ok(())
    }

    fn apply_overrides(config: &mut DriverConfig, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.tool_path {
            config.tool.path = Some(path.clone());
        }
        if let Some(timeout) = overrides.timeout_secs {
            config.tool.timeout_secs = timeout;
        }
        if let Some(dir) = &overrides.data_dir {
            config.storage.data_dir = Some(dir.clone());
        }
    }

    /// Expand ${VAR} references in `tool.extraEnv` values
    fn expand_env_vars(config: &mut DriverConfig, env: &HashMap<String, String>) {
        lazy_static::lazy_static! {
            static ref ENV_VAR_REGEX: Regex = Regex::new(ENV_VAR_PATTERN).unwrap();
        }

        for value in config.tool.extra_env.values_mut() {
            let expanded = ENV_VAR_REGEX.replace_all(value, |caps: &regex::Captures| {
                env.get(&caps[1]).cloned().unwrap_or_default()
            });
            *value = expanded.into_owned();
        }
    }

    /// Validate configuration values
    pub fn validate(config: &DriverConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.tool.timeout_secs == 0 {
            errors.push(ConfigValidationError {
                field: "tool.timeoutSecs".to_string(),
                message: "超时时间必须大于 0".to_string(),
            });
        }

        if !(1..=100).contains(&config.search.default_limit) {
            errors.push(ConfigValidationError {
                field: "search.defaultLimit".to_string(),
                message: format!("搜索数量必须在 1 到 100 之间: {}", config.search.default_limit),
            });
        }

        if config.messages.preview_length == 0 {
            errors.push(ConfigValidationError {
                field: "messages.previewLength".to_string(),
                message: "预览长度必须大于 0".to_string(),
            });
        }

        for outcome in config.classifier.extra_keywords.keys() {
            if OutcomeKind::from_config_name(outcome).is_none() {
                errors.push(ConfigValidationError {
                    field: format!("classifier.extraKeywords.{}", outcome),
                    message: format!("未知的结果类型: {}", outcome),
                });
            }
        }

        if let Some(path) = &config.tool.path
            && !path.exists()
        {
            warnings.push(ConfigValidationWarning {
                field: "tool.path".to_string(),
                message: format!("可执行文件不存在: {}", path.display()),
                suggestion: Some("删除 tool.path 以启用自动查找".to_string()),
            });
        }

        if config.keychain.passphrase_env.trim().is_empty() {
            warnings.push(ConfigValidationWarning {
                field: "keychain.passphraseEnv".to_string(),
                message: "未设置密钥覆盖环境变量名".to_string(),
                suggestion: None,
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}
