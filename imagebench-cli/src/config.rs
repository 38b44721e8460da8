//! Configuration loading from imagebench.toml
//!
//! imagebench configuration can be specified in an `imagebench.toml` file in the
//! project root. The configuration is automatically discovered by walking up from
//! the current directory.

use crate::pipeline::NativeImageOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked for by [`ImagebenchConfig::discover`]
pub const CONFIG_FILE_NAME: &str = "imagebench.toml";

/// imagebench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImagebenchConfig {
    /// Toolchain location
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Defaults for the native-image VMs
    #[serde(default, rename = "native-image")]
    pub native_image: NativeImageConfig,
    /// Arguments for the plain managed-runtime VM
    #[serde(default)]
    pub jvm: JvmConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolchainConfig {
    /// Installation root; falls back to $GRAALVM_HOME, then $JAVA_HOME
    #[serde(default)]
    pub home: Option<PathBuf>,
}

/// Native-image pipeline defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeImageConfig {
    /// Edition suffix of the registered VM configs (`default-<edition>`, `llvm-<edition>`)
    #[serde(default = "default_edition")]
    pub edition: String,
    /// Instrumented build+run cycles before the final build
    #[serde(default)]
    pub pgo_instrumented_iterations: usize,
    /// Collect profiles on the managed runtime instead of instrumented images
    #[serde(default)]
    pub hotspot_pgo: bool,
    /// Inline everything explored during instrumentation
    #[serde(default)]
    pub pgo_inline_explored: bool,
    /// Context-sensitive profiles
    #[serde(default = "default_true")]
    pub pgo_context_sensitive: bool,
    /// Gate mode: assertions, verification flags, every non-zero exit is fatal
    #[serde(default)]
    pub gate: bool,
}

impl Default for NativeImageConfig {
    fn default() -> Self {
        Self {
            edition: default_edition(),
            pgo_instrumented_iterations: 0,
            hotspot_pgo: false,
            pgo_inline_explored: false,
            pgo_context_sensitive: true,
            gate: false,
        }
    }
}

impl NativeImageConfig {
    /// Pipeline options for a VM variant
    pub fn options(&self, llvm: bool) -> NativeImageOptions {
        NativeImageOptions {
            pgo_instrumented_iterations: self.pgo_instrumented_iterations,
            pgo_inline_explored: self.pgo_inline_explored,
            pgo_context_sensitive: self.pgo_context_sensitive,
            hotspot_pgo: self.hotspot_pgo,
            gate: self.gate,
            llvm,
        }
    }
}

fn default_edition() -> String {
    "ce".to_string()
}
fn default_true() -> bool {
    true
}

/// Managed-runtime VM configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JvmConfig {
    /// Prepended to every `java` invocation
    #[serde(default)]
    pub extra_java_args: Vec<String>,
    /// Prepended to every launcher invocation
    #[serde(default)]
    pub extra_launcher_args: Vec<String>,
    /// Debugger flags; `-X` flags are passed to launchers as `--vm.X`
    #[serde(default)]
    pub debug_args: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root of the deterministic prepare/run hand-off directories
    #[serde(default = "default_prepared_root")]
    pub prepared_root: PathBuf,
    /// Default output format: "human" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            prepared_root: default_prepared_root(),
            format: default_format(),
        }
    }
}

fn default_prepared_root() -> PathBuf {
    PathBuf::from("target/imagebench")
}
fn default_format() -> String {
    "human".to_string()
}

impl ImagebenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# imagebench configuration

[toolchain]
# Installation root containing bin/java and bin/native-image.
# Falls back to $GRAALVM_HOME, then $JAVA_HOME (uncomment to pin)
# home = "/opt/graalvm"

[native-image]
# Registers native-image:default-<edition> and native-image:llvm-<edition>
edition = "ce"
# Instrumented build+run cycles before the final build
pgo_instrumented_iterations = 0
# Profile on the managed runtime instead of with instrumented images
hotspot_pgo = false
# Inline all explored methods while instrumenting
pgo_inline_explored = false
# Context-sensitive profiles
pgo_context_sensitive = true
# Gate mode: assertions, verification, non-zero exits abort the run
gate = false

[jvm]
extra_java_args = []
extra_launcher_args = []
debug_args = []

[output]
# Root of the prepare-native-image / run-prepared-image hand-off directories
prepared_root = "target/imagebench"
# Default output format: human, json
format = "human"
"#
        .to_string()
    }
}
