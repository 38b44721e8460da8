#![warn(missing_docs)]
//! imagebench Core - Invocation Handling
//!
//! Turns a managed-runtime style command line into the pieces the native-image
//! pipeline needs:
//! - [`split`] cuts it into VM flags, executable selector and program arguments
//! - [`classify`] sorts VM flags into classpath, system properties and image flags
//! - [`parse_benchmark_config`] extracts `-Dnative-image.benchmark.*` directives
//! - [`prepare_invocation`] does all three and derives the executable name
//!
//! Nothing in this crate touches the filesystem or spawns processes.

mod args;
mod directives;
mod error;

pub use args::{
    ClassifiedArgs, JAR_SELECTOR, SPACE_SEPARATED_VM_OPTIONS, SUPPORTED_VM_ARG_PREFIXES,
    SplitInvocation, classify, split,
};
pub use directives::{
    BENCHMARK_DIRECTIVE_PREFIX, BenchmarkConfig, BenchmarkConfigBuilder, PipelineMode,
    PreparedInvocation, parse_benchmark_config, prepare_invocation,
};
pub use error::ArgumentError;
