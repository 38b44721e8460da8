//! Toolchain Locator
//!
//! Resolves the installation root holding `bin/java`, `bin/native-image` and
//! `bin/gu`. The root comes from the configuration, then `$GRAALVM_HOME`, then
//! `$JAVA_HOME`.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variables consulted, in order, when no home is configured
pub const HOME_ENV_VARS: &[&str] = &["GRAALVM_HOME", "JAVA_HOME"];

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("No toolchain home configured; set [toolchain] home or one of {}", HOME_ENV_VARS.join(", "))]
    HomeNotConfigured,

    #[error("Toolchain home {0} does not exist")]
    HomeMissing(PathBuf),
}

/// An installed toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    home: PathBuf,
}

impl Toolchain {
    /// Use `home` as the installation root without checking it
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Pick the installation root from `explicit` or the environment
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ToolchainError> {
        if let Some(home) = explicit {
            return Ok(Self::new(home));
        }
        HOME_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .find(|value| !value.is_empty())
            .map(Self::new)
            .ok_or(ToolchainError::HomeNotConfigured)
    }

    /// Like [`Toolchain::resolve`], but the root must exist
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ToolchainError> {
        let toolchain = Self::resolve(explicit)?;
        if !toolchain.home.is_dir() {
            return Err(ToolchainError::HomeMissing(toolchain.home));
        }
        Ok(toolchain)
    }

    /// Installation root
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `bin/<command>` under the root
    pub fn launcher(&self, command: &str) -> PathBuf {
        self.home.join("bin").join(command)
    }

    /// The managed-runtime launcher
    pub fn java(&self) -> PathBuf {
        self.launcher("java")
    }

    /// The image builder
    pub fn native_image(&self) -> PathBuf {
        self.launcher("native-image")
    }

    /// The component updater
    pub fn gu(&self) -> PathBuf {
        self.launcher("gu")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_paths() {
        let toolchain = Toolchain::new("/opt/graalvm");
        assert_eq!(toolchain.java(), PathBuf::from("/opt/graalvm/bin/java"));
        assert_eq!(toolchain.native_image(), PathBuf::from("/opt/graalvm/bin/native-image"));
        assert_eq!(toolchain.gu(), PathBuf::from("/opt/graalvm/bin/gu"));
    }

    #[test]
    fn test_explicit_home_wins() {
        let toolchain = Toolchain::resolve(Some(Path::new("/somewhere"))).unwrap();
        assert_eq!(toolchain.home(), Path::new("/somewhere"));
    }

    #[test]
    fn test_locate_requires_existing_home() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Toolchain::locate(Some(dir.path())).is_ok());

        let missing = dir.path().join("missing");
        let err = Toolchain::locate(Some(&missing)).unwrap_err();
        assert!(matches!(err, ToolchainError::HomeMissing(path) if path == missing));
    }
}
