//! VM Variants
//!
//! A benchmark harness hands every invocation to a [`Vm`]. Variants share one
//! [`Host`] (toolchain, process runner, filesystem, working directory) and
//! differ in what they do with the arguments:
//!
//! - [`StandardVm`] runs `java` directly, or any `bin/<cmd>` launcher
//! - [`NativeImageVm`] drives the native-image pipeline
//! - [`ImageBuildVm`] measures image builds themselves (`native-image`, `gu rebuild-images`)
//!
//! [`VmRegistry`] is assembled explicitly at startup from the configuration.

use crate::config::{ImagebenchConfig, JvmConfig};
use crate::error::PipelineError;
use crate::filesystem::Filesystem;
use crate::pipeline::{NativeImageOptions, NativeImagePipeline, PipelineReport};
use crate::runner::{ProcessOutput, ProcessRunner, Sink, quote_command};
use crate::toolchain::Toolchain;
use chrono::{DateTime, Utc};
use imagebench_core::prepare_invocation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Argument that turns a native-image invocation into a plain `java` run
pub const VERSION_FLAG: &str = "-version";

/// Shared environment of every VM run
pub struct Host<'a> {
    /// Installation providing the launchers
    pub toolchain: &'a Toolchain,
    /// Executes external commands
    pub runner: &'a dyn ProcessRunner,
    /// Output directory handling
    pub fs: &'a dyn Filesystem,
    /// Absolute working directory of every command
    pub cwd: PathBuf,
    /// Root of the prepare/run hand-off directories, relative to `cwd` unless absolute
    pub prepared_root: PathBuf,
}

/// Result of one benchmark invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Exit code of the benchmark
    pub exit_code: i32,
    /// Combined stdout and stderr of the benchmark
    pub output: String,
    /// Host VM dimensions recorded with the result
    pub dimensions: BTreeMap<String, String>,
    /// Pipeline details; only for native-image runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineReport>,
    /// When the run finished
    pub timestamp: DateTime<Utc>,
}

impl RunOutcome {
    fn new(vm: &dyn Vm, exit_code: i32, output: String) -> Self {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("host-vm".to_string(), vm.name().to_string());
        dimensions.insert("host-vm-config".to_string(), vm.config_name().to_string());
        Self {
            exit_code,
            output,
            dimensions,
            pipeline: None,
            timestamp: Utc::now(),
        }
    }
}

/// A runnable VM configuration
pub trait Vm {
    /// Registry name, e.g. `native-image`
    fn name(&self) -> &str;

    /// Registry configuration, e.g. `default-ce`
    fn config_name(&self) -> &str;

    /// Run one benchmark invocation.
    ///
    /// `fatal` turns every non-zero exit of an intermediate step into an error.
    fn run(&self, host: &Host<'_>, args: &[String], fatal: bool) -> Result<RunOutcome, PipelineError>;
}

/// Plain managed-runtime VM
#[derive(Debug, Clone)]
pub struct StandardVm {
    name: String,
    config_name: String,
    extra_java_args: Vec<String>,
    extra_launcher_args: Vec<String>,
    debug_args: Vec<String>,
}

impl StandardVm {
    /// Debugger flags from `jvm` apply only to the `jvm` configuration
    pub fn new(name: impl Into<String>, config_name: impl Into<String>, jvm: &JvmConfig) -> Self {
        let config_name = config_name.into();
        let debug_args = if config_name == "jvm" {
            jvm.debug_args.clone()
        } else {
            Vec::new()
        };
        Self {
            name: name.into(),
            config_name,
            extra_java_args: jvm.extra_java_args.clone(),
            extra_launcher_args: jvm.extra_launcher_args.clone(),
            debug_args,
        }
    }

    /// Same VM without any extra or debug arguments
    pub fn bare(name: impl Into<String>, config_name: impl Into<String>) -> Self {
        Self::new(name, config_name, &JvmConfig::default())
    }

    /// Arguments of a `java` run: extra args, debug args, then `args`
    pub fn java_args(&self, args: &[String]) -> Vec<String> {
        self.extra_java_args
            .iter()
            .chain(&self.debug_args)
            .chain(args)
            .cloned()
            .collect()
    }

    /// Arguments of a launcher run; `-X` debug flags become `--vm.X`
    pub fn launcher_args(&self, args: &[String]) -> Vec<String> {
        let debug = self.debug_args.iter().map(|arg| match arg.strip_prefix('-') {
            Some(rest) if arg.starts_with("-X") => format!("--vm.{}", rest),
            _ => arg.clone(),
        });
        self.extra_launcher_args
            .iter()
            .cloned()
            .chain(debug)
            .chain(args.iter().cloned())
            .collect()
    }

    /// Run `bin/java` with the given arguments
    pub fn run_java(&self, host: &Host<'_>, args: &[String], fatal: bool) -> Result<ProcessOutput, PipelineError> {
        let mut command = vec![host.toolchain.java().display().to_string()];
        command.extend(self.java_args(args));
        info!("Running java on '{}' with: {}", self.name, quote_command(&command));
        let output = host
            .runner
            .run(&command, &Sink::Capture, &Sink::Capture, &host.cwd, fatal)?;
        Ok(output)
    }

    /// Run `bin/<cmd>` with the given arguments, capturing its output
    pub fn run_launcher(&self, host: &Host<'_>, cmd: &str, args: &[String]) -> Result<RunOutcome, PipelineError> {
        let mut command = vec![host.toolchain.launcher(cmd).display().to_string()];
        command.extend(self.launcher_args(args));
        info!("Running '{}' on '{}' with: {}", cmd, self.name, quote_command(&command));
        let output = host
            .runner
            .run(&command, &Sink::Capture, &Sink::Capture, &host.cwd, false)?;
        Ok(RunOutcome::new(self, output.exit_code, output.combined()))
    }
}

impl Vm for StandardVm {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_name(&self) -> &str {
        &self.config_name
    }

    fn run(&self, host: &Host<'_>, args: &[String], fatal: bool) -> Result<RunOutcome, PipelineError> {
        let output = self.run_java(host, args, fatal)?;
        Ok(RunOutcome::new(self, output.exit_code, output.combined()))
    }
}

/// Runs the benchmark as a native image
#[derive(Debug, Clone)]
pub struct NativeImageVm {
    base: StandardVm,
    options: NativeImageOptions,
}

impl NativeImageVm {
    /// `config_name` also names the final image
    pub fn new(name: impl Into<String>, config_name: impl Into<String>, options: NativeImageOptions) -> Self {
        Self {
            base: StandardVm::bare(name, config_name),
            options,
        }
    }

    /// Pipeline settings of this variant
    pub fn options(&self) -> &NativeImageOptions {
        &self.options
    }
}

impl Vm for NativeImageVm {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn config_name(&self) -> &str {
        self.base.config_name()
    }

    fn run(&self, host: &Host<'_>, args: &[String], fatal: bool) -> Result<RunOutcome, PipelineError> {
        if args.iter().any(|arg| arg == VERSION_FLAG) {
            return self.base.run(host, args, fatal);
        }

        let invocation = prepare_invocation(args)?;
        let report = NativeImagePipeline::new(host, self.options, self.config_name(), fatal).run(&invocation)?;

        let mut outcome = RunOutcome::new(self, report.exit_code(), report.output.clone());
        outcome
            .dimensions
            .insert("native-image.mode".to_string(), invocation.config.mode.to_string());
        outcome.pipeline = Some(report);
        Ok(outcome)
    }
}

/// Which tool an [`ImageBuildVm`] measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageBuildLauncher {
    /// `native-image --no-server <args>`
    NativeImage,
    /// `gu rebuild-images <args>`
    Gu,
}

/// Benchmarks the image build tools
#[derive(Debug, Clone)]
pub struct ImageBuildVm {
    base: StandardVm,
    launcher: ImageBuildLauncher,
}

impl ImageBuildVm {
    /// Variant measuring `launcher`
    pub fn new(name: impl Into<String>, config_name: impl Into<String>, launcher: ImageBuildLauncher) -> Self {
        Self {
            base: StandardVm::bare(name, config_name),
            launcher,
        }
    }
}

impl Vm for ImageBuildVm {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn config_name(&self) -> &str {
        self.base.config_name()
    }

    fn run(&self, host: &Host<'_>, args: &[String], _fatal: bool) -> Result<RunOutcome, PipelineError> {
        let (cmd, leading) = match self.launcher {
            ImageBuildLauncher::NativeImage => ("native-image", "--no-server"),
            ImageBuildLauncher::Gu => ("gu", "rebuild-images"),
        };
        let mut full = vec![leading.to_string()];
        full.extend(args.iter().cloned());
        self.base.run_launcher(host, cmd, &full)
    }
}

/// VMs addressable by `(name, config)`
#[derive(Default)]
pub struct VmRegistry {
    vms: Vec<Box<dyn Vm>>,
}

impl VmRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard set of VMs for `config`
    pub fn with_defaults(config: &ImagebenchConfig) -> Self {
        let native = &config.native_image;
        let edition = &native.edition;

        let mut registry = Self::new();
        registry.register(StandardVm::new("graalvm", "jvm", &config.jvm));
        registry.register(NativeImageVm::new(
            "native-image",
            format!("default-{}", edition),
            native.options(false),
        ));
        registry.register(NativeImageVm::new(
            "native-image",
            format!("llvm-{}", edition),
            native.options(true),
        ));
        registry.register(ImageBuildVm::new(
            "native-image-build",
            "default",
            ImageBuildLauncher::NativeImage,
        ));
        registry.register(ImageBuildVm::new("gu", "default", ImageBuildLauncher::Gu));
        registry
    }

    /// Add `vm`, replacing any VM with the same name and configuration
    pub fn register(&mut self, vm: impl Vm + 'static) {
        self.vms
            .retain(|existing| existing.name() != vm.name() || existing.config_name() != vm.config_name());
        self.vms.push(Box::new(vm));
    }

    /// Look up a VM
    pub fn get(&self, name: &str, config_name: &str) -> Option<&dyn Vm> {
        self.vms
            .iter()
            .find(|vm| vm.name() == name && vm.config_name() == config_name)
            .map(|vm| vm.as_ref())
    }

    /// All VMs in registration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Vm> {
        self.vms.iter().map(|vm| vm.as_ref())
    }

    /// Number of registered VMs
    pub fn len(&self) -> usize {
        self.vms.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::LocalFilesystem;
    use crate::pipeline::FinalRun;
    use crate::pipeline::testing::{FakeToolchainRunner, directive};

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    fn host<'a>(toolchain: &'a Toolchain, runner: &'a FakeToolchainRunner, cwd: &std::path::Path) -> Host<'a> {
        Host {
            toolchain,
            runner,
            fs: &LocalFilesystem,
            cwd: cwd.to_path_buf(),
            prepared_root: PathBuf::from("prepared"),
        }
    }

    #[test]
    fn test_registry_defaults() {
        let registry = VmRegistry::with_defaults(&ImagebenchConfig::default());
        let keys: Vec<_> = registry
            .iter()
            .map(|vm| format!("{}/{}", vm.name(), vm.config_name()))
            .collect();
        assert_eq!(
            keys,
            vec![
                "graalvm/jvm",
                "native-image/default-ce",
                "native-image/llvm-ce",
                "native-image-build/default",
                "gu/default",
            ]
        );
        assert!(registry.get("native-image", "llvm-ce").is_some());
        assert!(registry.get("native-image", "default-ee").is_none());
    }

    #[test]
    fn test_registry_edition_and_replacement() {
        let mut config = ImagebenchConfig::default();
        config.native_image.edition = "ee".to_string();
        let mut registry = VmRegistry::with_defaults(&config);
        assert!(registry.get("native-image", "default-ee").is_some());

        let before = registry.len();
        registry.register(StandardVm::bare("graalvm", "jvm"));
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn test_launcher_args_translate_debug_flags() {
        let jvm = JvmConfig {
            extra_java_args: strings(&["-Xss2m"]),
            extra_launcher_args: strings(&["--experimental-options"]),
            debug_args: strings(&["-Xdebug", "-agentlib:jdwp=transport=dt_socket"]),
        };
        let vm = StandardVm::new("graalvm", "jvm", &jvm);
        assert_eq!(
            vm.launcher_args(&strings(&["app.js"])),
            vec![
                "--experimental-options",
                "--vm.Xdebug",
                "-agentlib:jdwp=transport=dt_socket",
                "app.js"
            ]
        );
        assert_eq!(
            vm.java_args(&strings(&["Main"])),
            vec!["-Xss2m", "-Xdebug", "-agentlib:jdwp=transport=dt_socket", "Main"]
        );

        // Debugger flags only attach to the jvm configuration
        let other = StandardVm::new("graalvm", "native", &jvm);
        assert_eq!(other.java_args(&strings(&["Main"])), vec!["-Xss2m", "Main"]);
    }

    #[test]
    fn test_version_bypasses_pipeline() {
        let root = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::new("/gvm");
        let runner = FakeToolchainRunner::default();
        let host = host(&toolchain, &runner, root.path());

        let vm = NativeImageVm::new("native-image", "default-ce", NativeImageOptions::default());
        let outcome = vm.run(&host, &strings(&["-version"]), false).unwrap();
        assert!(outcome.pipeline.is_none());
        assert_eq!(runner.commands(), vec![strings(&["/gvm/bin/java", "-version"])]);
    }

    #[test]
    fn test_native_image_vm_runs_pipeline() {
        let root = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::new("/gvm");
        let runner = FakeToolchainRunner::default();
        let host = host(&toolchain, &runner, root.path());

        let vm = NativeImageVm::new("native-image", "default-ce", NativeImageOptions::default());
        let scratch = directive(&format!("benchmark-output-dir={}", root.path().display()));
        let outcome = vm
            .run(&host, &strings(&[&scratch, &directive("needs-config=false"), "Main", "3"]), false)
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.output, "benchmark output\n");
        assert_eq!(outcome.dimensions["host-vm"], "native-image");
        assert_eq!(outcome.dimensions["host-vm-config"], "default-ce");
        assert_eq!(outcome.dimensions["native-image.mode"], "full");
        let report = outcome.pipeline.unwrap();
        assert!(matches!(report.final_run, FinalRun::Executed { .. }));
        assert!(report.final_image.ends_with("main-default-ce"));
    }

    #[test]
    fn test_native_image_vm_rejects_bad_arguments() {
        let root = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::new("/gvm");
        let runner = FakeToolchainRunner::default();
        let host = host(&toolchain, &runner, root.path());

        let vm = NativeImageVm::new("native-image", "default-ce", NativeImageOptions::default());
        let err = vm.run(&host, &strings(&["-cp", "a.jar"]), false).unwrap_err();
        assert!(matches!(err, PipelineError::Argument(_)));
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_image_build_vms() {
        let root = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::new("/gvm");
        let runner = FakeToolchainRunner::default();
        let host = host(&toolchain, &runner, root.path());

        ImageBuildVm::new("native-image-build", "default", ImageBuildLauncher::NativeImage)
            .run(&host, &strings(&["--help"]), false)
            .unwrap();
        ImageBuildVm::new("gu", "default", ImageBuildLauncher::Gu)
            .run(&host, &strings(&["js"]), false)
            .unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                strings(&["/gvm/bin/native-image", "--no-server", "--help"]),
                strings(&["/gvm/bin/gu", "rebuild-images", "js"]),
            ]
        );
    }

    #[test]
    fn test_mode_dimension_matches_report_json() {
        let root = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::new("/gvm");
        let runner = FakeToolchainRunner::default();
        let host = host(&toolchain, &runner, root.path());

        let vm = NativeImageVm::new("native-image", "default-ce", NativeImageOptions::default());
        let outcome = vm
            .run(&host, &strings(&[&directive("prepare-native-image=true"), "Main"]), false)
            .unwrap();

        let dimension = &outcome.dimensions["native-image.mode"];
        assert_eq!(dimension, "prepare-only");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["dimensions"]["native-image.mode"], "prepare-only");
        let serialized = serde_json::to_value(imagebench_core::PipelineMode::PrepareOnly).unwrap();
        assert_eq!(serialized, dimension.as_str());
    }
}
