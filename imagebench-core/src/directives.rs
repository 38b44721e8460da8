//! Benchmark Directives
//!
//! Tool configuration travels inside the VM flags as system properties in the
//! reserved `-Dnative-image.benchmark.` namespace, e.g.
//! `-Dnative-image.benchmark.extra-run-arg=--verbose`. The parser strips these
//! out and leaves the plain benchmark invocation behind.

use crate::args::{ClassifiedArgs, SplitInvocation, classify, split};
use crate::error::ArgumentError;
use serde::Serialize;
use std::path::PathBuf;

/// Prefix of every benchmark directive
pub const BENCHMARK_DIRECTIVE_PREFIX: &str = "-Dnative-image.benchmark.";

/// Which halves of the pipeline a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineMode {
    /// Build and run in one go
    #[default]
    Full,
    /// Build into the deterministic hand-off directory and stop
    PrepareOnly,
    /// Run an image previously built with [`PipelineMode::PrepareOnly`]
    RunPreparedOnly,
}

impl PipelineMode {
    /// Name used in reports; matches the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineMode::Full => "full",
            PipelineMode::PrepareOnly => "prepare-only",
            PipelineMode::RunPreparedOnly => "run-prepared-only",
        }
    }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings collected from benchmark directives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkConfig {
    /// Appended to every image build
    pub extra_image_build_args: Vec<String>,
    /// Appended to every image run
    pub extra_run_args: Vec<String>,
    /// Replace the program arguments of the agent run
    pub extra_agent_run_args: Vec<String>,
    /// Replace the program arguments of instrumented image runs
    pub extra_profile_run_args: Vec<String>,
    /// Replace the program arguments of the agent run when it also collects profiles
    pub extra_agent_profile_run_args: Vec<String>,
    /// Appended to the executable name
    pub benchmark_name: Option<String>,
    /// Parent directory for the per-run temporary directory
    pub benchmark_output_dir: Option<PathBuf>,
    /// Whether the agent has to collect reflection configuration
    pub needs_config: bool,
    /// Pre-existing configuration directory; disables the agent run
    pub config_dir: Option<PathBuf>,
    /// Overrides the VM's instrumentation iteration count
    pub instrumentation_iterations: Option<usize>,
    /// Prepare/run split
    pub mode: PipelineMode,
}

impl BenchmarkConfig {
    /// Only build the image into the hand-off directory
    pub fn prepare_image_only(&self) -> bool {
        self.mode == PipelineMode::PrepareOnly
    }

    /// Only run the image found in the hand-off directory
    pub fn run_prepared_image_only(&self) -> bool {
        self.mode == PipelineMode::RunPreparedOnly
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfigBuilder::default().finish(None)
    }
}

/// Accumulates directives; validation happens once in [`BenchmarkConfigBuilder::build`]
#[derive(Debug, Clone, Default)]
pub struct BenchmarkConfigBuilder {
    extra_image_build_args: Vec<String>,
    extra_run_args: Vec<String>,
    extra_agent_run_args: Vec<String>,
    extra_profile_run_args: Vec<String>,
    extra_agent_profile_run_args: Vec<String>,
    benchmark_name: Option<String>,
    benchmark_output_dir: Option<PathBuf>,
    needs_config: Option<bool>,
    config_dir: Option<PathBuf>,
    /// Raw value; parsed in `build` once the mode flags are known to agree
    instrumentation_iterations: Option<String>,
    prepare_native_image: bool,
    run_prepared_image: bool,
}

impl BenchmarkConfigBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one directive, given as it appeared on the command line.
    ///
    /// List-valued keys append, scalar keys overwrite, boolean keys are true
    /// only for the literal `true`.
    pub fn directive(&mut self, arg: &str) -> Result<&mut Self, ArgumentError> {
        let invalid = |reason: &str| ArgumentError::InvalidBenchmarkArgument {
            arg: arg.to_string(),
            reason: reason.to_string(),
        };

        let body = arg
            .strip_prefix(BENCHMARK_DIRECTIVE_PREFIX)
            .ok_or_else(|| invalid("missing -Dnative-image.benchmark. prefix"))?;
        let (key, value) = body
            .split_once('=')
            .ok_or_else(|| invalid("expected <key>=<value>"))?;

        match key {
            "extra-image-build-argument" => self.extra_image_build_args.push(value.to_string()),
            "extra-run-arg" => self.extra_run_args.push(value.to_string()),
            "extra-agent-run-arg" => self.extra_agent_run_args.push(value.to_string()),
            "extra-profile-run-arg" => self.extra_profile_run_args.push(value.to_string()),
            "extra-agent-profile-run-arg" => {
                self.extra_agent_profile_run_args.push(value.to_string())
            }
            "needs-config" => self.needs_config = Some(value == "true"),
            "config-dir" => self.config_dir = Some(PathBuf::from(value)),
            "benchmark-output-dir" => self.benchmark_output_dir = Some(PathBuf::from(value)),
            "benchmark-name" => self.benchmark_name = Some(value.to_string()),
            "instrumentation-iteration-num" => {
                self.instrumentation_iterations = Some(value.to_string())
            }
            "prepare-native-image" => self.prepare_native_image = value == "true",
            "run-prepared-image" => self.run_prepared_image = value == "true",
            _ => return Err(invalid("unknown key")),
        }

        Ok(self)
    }

    /// Validate and produce the final configuration
    pub fn build(self) -> Result<BenchmarkConfig, ArgumentError> {
        if self.prepare_native_image && self.run_prepared_image {
            return Err(ArgumentError::ConflictingModeFlags);
        }
        let iterations = match &self.instrumentation_iterations {
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                ArgumentError::InvalidBenchmarkArgument {
                    arg: format!("{}instrumentation-iteration-num={}", BENCHMARK_DIRECTIVE_PREFIX, raw),
                    reason: "instrumentation-iteration-num must be a non-negative integer".to_string(),
                }
            })?),
            None => None,
        };
        Ok(self.finish(iterations))
    }

    fn finish(self, instrumentation_iterations: Option<usize>) -> BenchmarkConfig {
        let mode = match (self.prepare_native_image, self.run_prepared_image) {
            (true, _) => PipelineMode::PrepareOnly,
            (false, true) => PipelineMode::RunPreparedOnly,
            (false, false) => PipelineMode::Full,
        };

        BenchmarkConfig {
            extra_image_build_args: self.extra_image_build_args,
            extra_run_args: self.extra_run_args,
            extra_agent_run_args: self.extra_agent_run_args,
            extra_profile_run_args: self.extra_profile_run_args,
            extra_agent_profile_run_args: self.extra_agent_profile_run_args,
            benchmark_name: self.benchmark_name,
            benchmark_output_dir: self.benchmark_output_dir,
            needs_config: self.needs_config.unwrap_or(true),
            config_dir: self.config_dir,
            instrumentation_iterations,
            mode,
        }
    }
}

/// Separate benchmark directives from the remaining VM flags.
///
/// Returns the validated configuration and the untouched flags in their
/// original order.
pub fn parse_benchmark_config<S: AsRef<str>>(
    flags: &[S],
) -> Result<(BenchmarkConfig, Vec<String>), ArgumentError> {
    let mut builder = BenchmarkConfigBuilder::new();
    let mut passthrough = Vec::with_capacity(flags.len());

    for flag in flags {
        let flag = flag.as_ref();
        if flag.starts_with(BENCHMARK_DIRECTIVE_PREFIX) {
            builder.directive(flag)?;
        } else {
            passthrough.push(flag.to_string());
        }
    }

    Ok((builder.build()?, passthrough))
}

/// A fully interpreted invocation, ready for the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedInvocation {
    /// Directives found in the VM flags
    pub config: BenchmarkConfig,
    /// The invocation with directives removed
    pub benchmark: SplitInvocation,
    /// The remaining VM flags, classified
    pub classified: ClassifiedArgs,
    /// Base name for every image built from this invocation
    pub executable_name: String,
}

impl PreparedInvocation {
    /// `-jar <path>` or the main class
    pub fn executable(&self) -> &[String] {
        &self.benchmark.executable_selector
    }

    /// Arguments handed to every run of a built image: the supported VM
    /// flags followed by the program arguments
    pub fn image_run_args(&self) -> Vec<String> {
        self.classified
            .image_vm_args
            .iter()
            .chain(&self.benchmark.post_executable_args)
            .cloned()
            .collect()
    }

    /// The managed-runtime invocation without any directive
    pub fn benchmark_invocation(&self) -> Vec<String> {
        self.benchmark.to_tokens()
    }
}

/// Interpret a raw invocation: split it, extract directives, classify the rest.
///
/// All parse-time validation happens here.
pub fn prepare_invocation<S: AsRef<str>>(args: &[S]) -> Result<PreparedInvocation, ArgumentError> {
    let raw = split(args)?;
    let (config, passthrough) = parse_benchmark_config(&raw.pre_executable_flags)?;
    let classified = classify(&passthrough)?;

    let benchmark = SplitInvocation {
        pre_executable_flags: passthrough,
        executable_selector: raw.executable_selector,
        post_executable_args: raw.post_executable_args,
    };
    let executable_name = benchmark.executable_name(config.benchmark_name.as_deref());

    Ok(PreparedInvocation {
        config,
        benchmark,
        classified,
        executable_name,
    })
}
