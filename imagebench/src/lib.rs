#![warn(missing_docs)]
//! # imagebench
//!
//! Benchmark orchestration for ahead-of-time compiled native images.
//!
//! Given an ordinary managed-runtime invocation (`java [flags] Main args`),
//! imagebench:
//! - **Collects configuration**: runs once under the native-image agent to record
//!   reflection and dynamic-access metadata
//! - **Profiles**: builds and runs instrumented images, each iteration feeding
//!   its profile into the next build
//! - **Builds**: produces the final, profile-optimized image
//! - **Runs**: executes the image with the benchmark's arguments and reports its
//!   exit code and output
//!
//! Pipeline behaviour is tuned per invocation with `-Dnative-image.benchmark.*`
//! directives placed before the executable.
//!
//! ## Quick Start
//!
//! ```text
//! imagebench run --vm native-image --vm-config default-ce -- \
//!     -Dnative-image.benchmark.benchmark-name=fib -Xmx2g -cp app.jar bench.Fib 35
//! ```
//!
//! ## Split Builds
//!
//! ```text
//! imagebench run -- -Dnative-image.benchmark.prepare-native-image=true -jar app.jar
//! imagebench run -- -Dnative-image.benchmark.run-prepared-image=true -jar app.jar
//! ```

// Re-export invocation handling
pub use imagebench_core::{
    ArgumentError, BENCHMARK_DIRECTIVE_PREFIX, BenchmarkConfig, BenchmarkConfigBuilder,
    ClassifiedArgs, JAR_SELECTOR, PipelineMode, PreparedInvocation, SplitInvocation, classify,
    parse_benchmark_config, prepare_invocation, split,
};

// Re-export pipeline and VMs
pub use imagebench_cli::{
    CONFIG_FILE_NAME, CommandSet, DryRunFilesystem, DryRunner, FinalRun, Filesystem, Host,
    ImageBuildLauncher, ImageBuildVm, ImagebenchConfig, LocalFilesystem, NativeImageOptions,
    NativeImagePipeline, NativeImageVm, Phase, PipelineError, PipelineReport, ProcessOutput,
    ProcessRunner, RunLayout, RunOutcome, RunnerError, Sink, StandardVm, StepRecord, SystemRunner,
    Toolchain, ToolchainError, Vm, VmRegistry,
};

/// Run the imagebench CLI.
///
/// Call this from a binary's `main()`:
/// ```ignore
/// fn main() {
///     imagebench::run().unwrap();
/// }
/// ```
pub use imagebench_cli::run;
