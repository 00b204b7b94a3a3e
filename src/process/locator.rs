//! Locating the external tool executable
//!
//! Resolution order, first match wins:
//! 1. `<install>/Include/<name>`
//! 2. architecture-specific name (`ipatool-<os>-<arch>`) in `<install>/Include` or `<install>`
//! 3. `<install>/<name>`, next to the application binary
//! 4. recursive search under `<install>`
//! 5. bare `<name>`, left to the OS search path
//!
//! The resolved path is cached for the lifetime of the locator.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Base name of the external tool
pub const TOOL_BASE_NAME: &str = "ipatool";

/// Bundled tool directory relative to the install directory
const BUNDLE_DIR: &str = "Include";

/// Maximum depth of the recursive fallback search
const MAX_SEARCH_DEPTH: usize = 6;

/// Which resolution step produced the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Configured,
    Bundled,
    ArchitectureSpecific,
    BesideApplication,
    RecursiveSearch,
    SearchPath,
}

/// A resolved executable path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub path: PathBuf,
    pub resolved_by: ResolvedBy,
}

/// Platform executable name for the tool
pub fn executable_name() -> String {
    if cfg!(windows) {
        format!("{}.exe", TOOL_BASE_NAME)
    } else {
        TOOL_BASE_NAME.to_string()
    }
}

/// Architecture-specific bundled binary name, e.g. `ipatool-linux-amd64`
pub fn architecture_executable_name() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    let suffix = if cfg!(windows) { ".exe" } else { "" };
    format!("{}-{}-{}{}", TOOL_BASE_NAME, os, arch, suffix)
}

/// Finds the tool executable and caches the answer
#[derive(Debug)]
pub struct ToolLocator {
    install_dir: PathBuf,
    configured: Option<PathBuf>,
    cached: OnceLock<ResolvedTool>,
}

impl ToolLocator {
    /// Locator searching under `install_dir`
    pub fn new(install_dir: PathBuf) -> Self {
        Self {
            install_dir,
            configured: None,
            cached: OnceLock::new(),
        }
    }

    /// Locator rooted at the directory of the running binary
    pub fn for_current_exe() -> Self {
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(install_dir)
    }

    /// An explicit path that bypasses resolution
    pub fn with_configured_path(mut self, path: Option<PathBuf>) -> Self {
        self.configured = path;
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Resolved executable, computed once
    pub fn resolve(&self) -> &ResolvedTool {
        self.cached.get_or_init(|| {
            let resolved = self.resolve_uncached();
            debug!(
                path = %resolved.path.display(),
                resolved_by = ?resolved.resolved_by,
                "resolved tool executable"
            );
            resolved
        })
    }

    fn resolve_uncached(&self) -> ResolvedTool {
        if let Some(path) = &self.configured {
            return ResolvedTool {
                path: path.clone(),
                resolved_by: ResolvedBy::Configured,
            };
        }

        let name = executable_name();
        let arch_name = architecture_executable_name();
        let bundle_dir = self.install_dir.join(BUNDLE_DIR);

        let candidates = [
            (bundle_dir.join(&name), ResolvedBy::Bundled),
            (bundle_dir.join(&arch_name), ResolvedBy::ArchitectureSpecific),
            (self.install_dir.join(&arch_name), ResolvedBy::ArchitectureSpecific),
            (self.install_dir.join(&name), ResolvedBy::BesideApplication),
        ];

        for (path, resolved_by) in candidates {
            if path.is_file() {
                return ResolvedTool { path, resolved_by };
            }
        }

        if let Some(path) = self.search_recursively(&[name.as_str(), arch_name.as_str()]) {
            return ResolvedTool {
                path,
                resolved_by: ResolvedBy::RecursiveSearch,
            };
        }

        warn!(
            install_dir = %self.install_dir.display(),
            "bundled tool not found, falling back to search path"
        );
        ResolvedTool {
            path: PathBuf::from(name),
            resolved_by: ResolvedBy::SearchPath,
        }
    }

    fn search_recursively(&self, names: &[&str]) -> Option<PathBuf> {
        WalkDir::new(&self.install_dir)
            .max_depth(MAX_SEARCH_DEPTH)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|file_name| names.contains(&file_name))
            })
            .map(|entry| entry.into_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"#!/bin/sh\n").unwrap();
    }

    #[test]
    fn test_configured_path_wins() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join(BUNDLE_DIR).join(executable_name()));

        let locator = ToolLocator::new(dir.path().to_path_buf())
            .with_configured_path(Some(PathBuf::from("/opt/custom/ipatool")));
        let resolved = locator.resolve();
        assert_eq!(resolved.resolved_by, ResolvedBy::Configured);
        assert_eq!(resolved.path, PathBuf::from("/opt/custom/ipatool"));
    }

    #[test]
    fn test_bundled_before_beside_application() {
        let dir = TempDir::new().unwrap();
        let bundled = dir.path().join(BUNDLE_DIR).join(executable_name());
        touch(&bundled);
        touch(&dir.path().join(executable_name()));

        let locator = ToolLocator::new(dir.path().to_path_buf());
        assert_eq!(locator.resolve().path, bundled);
        assert_eq!(locator.resolve().resolved_by, ResolvedBy::Bundled);
    }

    #[test]
    fn test_architecture_specific_name() {
        let dir = TempDir::new().unwrap();
        let arch = dir.path().join(architecture_executable_name());
        touch(&arch);
        touch(&dir.path().join(executable_name()));

        let locator = ToolLocator::new(dir.path().to_path_buf());
        assert_eq!(locator.resolve().path, arch);
        assert_eq!(locator.resolve().resolved_by, ResolvedBy::ArchitectureSpecific);
    }

    #[test]
    fn test_beside_application() {
        let dir = TempDir::new().unwrap();
        let beside = dir.path().join(executable_name());
        touch(&beside);

        let locator = ToolLocator::new(dir.path().to_path_buf());
        assert_eq!(locator.resolve().resolved_by, ResolvedBy::BesideApplication);
        assert_eq!(locator.resolve().path, beside);
    }

    #[test]
    fn test_recursive_search() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("tools").join("bin").join(executable_name());
        touch(&nested);

        let locator = ToolLocator::new(dir.path().to_path_buf());
        assert_eq!(locator.resolve().resolved_by, ResolvedBy::RecursiveSearch);
        assert_eq!(locator.resolve().path, nested);
    }

    #[test]
    fn test_falls_back_to_search_path() {
        let dir = TempDir::new().unwrap();
        let locator = ToolLocator::new(dir.path().to_path_buf());
        assert_eq!(locator.resolve().resolved_by, ResolvedBy::SearchPath);
        assert_eq!(locator.resolve().path, PathBuf::from(executable_name()));
    }

    #[test]
    fn test_resolution_is_cached() {
        let dir = TempDir::new().unwrap();
        let locator = ToolLocator::new(dir.path().to_path_buf());
        assert_eq!(locator.resolve().resolved_by, ResolvedBy::SearchPath);

        touch(&dir.path().join(executable_name()));
        assert_eq!(locator.resolve().resolved_by, ResolvedBy::SearchPath);
    }

    #[test]
    fn test_architecture_name_format() {
        let name = architecture_executable_name();
        assert!(name.starts_with("ipatool-"));
        assert_eq!(name.matches('-').count(), 2);
    }
}
