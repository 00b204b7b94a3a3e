//! Error handling for the App Store tool driver
//!
//! Expected failures reported by the external tool are never errors here:
//! they are classified into outcomes. This type covers the conditions that
//! stop a call before the tool could answer.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate
pub type DriverResult<T> = Result<T, DriverError>;

/// Main error type for driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("账户不能为空")]
    EmptyAccount,

    #[error("密钥存储失败: {message}")]
    StorageError { message: String },

    #[error("无法启动进程 {}: {message}", path.display())]
    ProcessLaunchFailure { path: PathBuf, message: String },

    #[error("操作已取消")]
    Cancelled,

    #[error("参数 {field} 无效: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("配置错误: {0}")]
    ConfigError(String),
}

impl DriverError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageError {
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Check if the caller may retry the same call
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StorageError { .. } | Self::Cancelled)
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::EmptyAccount => vec!["请输入 Apple ID 账户"],
            Self::StorageError { .. } => vec![
                "请检查数据目录是否可写",
                "稍后重试",
            ],
            Self::ProcessLaunchFailure { .. } => vec![
                "请确认 ipatool 已安装或位于程序目录的 Include 文件夹中",
                "可通过 --tool-path 或 IPA_BUYER_TOOL_PATH 指定可执行文件",
            ],
            Self::Cancelled => vec!["重新提交请求"],
            Self::InvalidArgument { .. } => vec!["请检查输入参数"],
            Self::ConfigError(_) => vec![
                "请检查 .ipa-buyer.yaml 配置文件",
                "删除无效的配置项后重试",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyAccount => "EMPTY_ACCOUNT",
            Self::StorageError { .. } => "STORAGE_ERROR",
            Self::ProcessLaunchFailure { .. } => "PROCESS_LAUNCH_FAILURE",
            Self::Cancelled => "CANCELLED",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_account_error() {
        let error = DriverError::EmptyAccount;

        assert_eq!(error.code(), "EMPTY_ACCOUNT");
        assert!(!error.is_recoverable());
        assert!(!error.suggested_actions().is_empty());
    }

    #[test]
    fn test_storage_error_is_recoverable() {
        let error = DriverError::storage("disk full");

        assert_eq!(error.code(), "STORAGE_ERROR");
        assert!(error.is_recoverable());
        assert!(error.to_string().contains("disk full"));
    }

    #[test]
    fn test_launch_failure_is_not_recoverable() {
        let error = DriverError::ProcessLaunchFailure {
            path: PathBuf::from("/opt/ipatool"),
            message: "No such file or directory".to_string(),
        };

        assert!(!error.is_recoverable());
        assert_eq!(error.code(), "PROCESS_LAUNCH_FAILURE");
        let display = error.to_string();
        assert!(display.contains("/opt/ipatool"));
        assert!(display.contains("No such file"));
    }

    #[test]
    fn test_invalid_argument_display() {
        let error = DriverError::invalid("email", "不能为空");

        assert_eq!(error.code(), "INVALID_ARGUMENT");
        assert!(error.to_string().contains("email"));
    }

    #[test]
    fn test_rusqlite_error_maps_to_storage() {
        let error: DriverError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(error.code(), "STORAGE_ERROR");
    }
}
