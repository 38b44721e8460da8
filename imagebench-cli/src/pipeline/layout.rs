//! Run Layout
//!
//! Every file a pipeline run reads or writes lives under one output directory:
//!
//! ```text
//! <output-dir>/
//!   config/                              agent-collected configuration
//!   <exe>.iprof, <exe>1.iprof, ...       profiles, one per instrumentation run
//!   <exe>-hot-spot-{stdout,stderr}.log   agent run output
//!   <exe>-instrument-<i>-{stdout,stderr}.log
//!   <exe>-instrument, <exe>-instrument1  instrumented images
//!   <image>-probabilities.log            PGO verification dumps
//!   <exe>-<config>                       the final image
//! ```

use std::path::{Path, PathBuf};

/// Extension of profile dumps
pub const PROFILE_EXTENSION: &str = "iprof";

const PREPARED_DIR_PREFIX: &str = "native-image-bench-";

/// Paths of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    output_dir: PathBuf,
    executable_name: String,
    final_image_name: String,
}

impl RunLayout {
    /// Layout rooted at an already resolved output directory
    pub fn new(output_dir: impl Into<PathBuf>, executable_name: &str, config_name: &str) -> Self {
        Self {
            output_dir: output_dir.into(),
            executable_name: executable_name.to_string(),
            final_image_name: format!("{}-{}", executable_name, config_name),
        }
    }

    /// Deterministic hand-off directory shared by `prepare-native-image` and
    /// `run-prepared-image`
    pub fn prepared_dir(root: &Path, executable_name: &str, config_name: &str) -> PathBuf {
        root.join(format!(
            "{}{}-{}",
            PREPARED_DIR_PREFIX, executable_name, config_name
        ))
    }

    /// Suffix of the per-run temporary directory
    pub fn temp_dir_suffix(executable_name: &str) -> String {
        format!("bench-{}", executable_name)
    }

    /// Root of everything below
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Base name derived from the executable
    pub fn executable_name(&self) -> &str {
        &self.executable_name
    }

    /// `<exe>-<config>`
    pub fn final_image_name(&self) -> &str {
        &self.final_image_name
    }

    /// Where the final image is written
    pub fn final_image_path(&self) -> PathBuf {
        self.output_dir.join(&self.final_image_name)
    }

    /// Where the agent writes its configuration
    pub fn agent_config_dir(&self) -> PathBuf {
        self.output_dir.join("config")
    }

    /// Profile written by instrumentation run `iteration`; iteration 0 and
    /// managed-runtime profiling have no index
    pub fn profile_path(&self, iteration: usize) -> PathBuf {
        let index = if iteration > 0 {
            iteration.to_string()
        } else {
            String::new()
        };
        self.output_dir.join(format!(
            "{}{}.{}",
            self.executable_name, index, PROFILE_EXTENSION
        ))
    }

    /// `<exe>-instrument`, `<exe>-instrument1`, ...
    pub fn instrumentation_image_name(&self, iteration: usize) -> String {
        if iteration > 0 {
            format!("{}-instrument{}", self.executable_name, iteration)
        } else {
            format!("{}-instrument", self.executable_name)
        }
    }

    /// An image inside the output directory
    pub fn image_path(&self, image_name: &str) -> PathBuf {
        self.output_dir.join(image_name)
    }

    /// PGO verification dump of an image build
    pub fn verification_dump_path(&self, image_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-probabilities.log", image_name))
    }

    /// stdout and stderr logs of the agent run
    pub fn hotspot_logs(&self) -> (PathBuf, PathBuf) {
        self.log_pair("hot-spot")
    }

    /// stdout and stderr logs of instrumentation run `iteration`
    pub fn instrumentation_logs(&self, iteration: usize) -> (PathBuf, PathBuf) {
        self.log_pair(&format!("instrument-{}", iteration))
    }

    fn log_pair(&self, step: &str) -> (PathBuf, PathBuf) {
        let stem = format!("{}-{}", self.executable_name, step);
        (
            self.output_dir.join(format!("{}-stdout.log", stem)),
            self.output_dir.join(format!("{}-stderr.log", stem)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RunLayout {
        RunLayout::new("/out", "fib", "default-ce")
    }

    #[test]
    fn test_profile_paths() {
        let layout = layout();
        assert_eq!(layout.profile_path(0), PathBuf::from("/out/fib.iprof"));
        assert_eq!(layout.profile_path(1), PathBuf::from("/out/fib1.iprof"));
        assert_eq!(layout.profile_path(12), PathBuf::from("/out/fib12.iprof"));
    }

    #[test]
    fn test_image_names() {
        let layout = layout();
        assert_eq!(layout.final_image_name(), "fib-default-ce");
        assert_eq!(layout.final_image_path(), PathBuf::from("/out/fib-default-ce"));
        assert_eq!(layout.instrumentation_image_name(0), "fib-instrument");
        assert_eq!(layout.instrumentation_image_name(2), "fib-instrument2");
        assert_eq!(
            layout.verification_dump_path("fib-instrument2"),
            PathBuf::from("/out/fib-instrument2-probabilities.log")
        );
    }

    #[test]
    fn test_log_paths() {
        let layout = layout();
        assert_eq!(
            layout.hotspot_logs(),
            (
                PathBuf::from("/out/fib-hot-spot-stdout.log"),
                PathBuf::from("/out/fib-hot-spot-stderr.log")
            )
        );
        assert_eq!(
            layout.instrumentation_logs(0).1,
            PathBuf::from("/out/fib-instrument-0-stderr.log")
        );
    }

    #[test]
    fn test_prepared_dir_is_deterministic() {
        let root = Path::new("/work/target/imagebench");
        let first = RunLayout::prepared_dir(root, "fib", "default-ce");
        let second = RunLayout::prepared_dir(root, "fib", "default-ce");
        assert_eq!(first, second);
        assert_eq!(
            first,
            PathBuf::from("/work/target/imagebench/native-image-bench-fib-default-ce")
        );
        assert_ne!(first, RunLayout::prepared_dir(root, "fib", "llvm-ce"));
    }
}
