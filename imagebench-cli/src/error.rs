use crate::runner::RunnerError;
use crate::toolchain::ToolchainError;
use imagebench_core::ArgumentError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of a benchmark run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The invocation could not be interpreted; nothing was executed
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// No usable toolchain
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// A step could not be run, or exited non-zero in fatal mode
    #[error(transparent)]
    Process(#[from] RunnerError),

    /// Output directory handling failed
    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        /// What was attempted
        action: &'static str,
        /// Directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}
