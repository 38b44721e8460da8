//! Native-Image Build Pipeline
//!
//! Turns one managed-runtime invocation into a native-image benchmark run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PreparedInvocation (split + classified + directives)
//!       │
//!       ▼
//! ┌─────────────┐
//! │   layout    │  P0: output directory (temp or deterministic hand-off)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ agent run   │  P1: java + native-image-agent and/or PGO instrumentation
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ instrument  │  P2: build `<exe>-instrument<i>`, run it, dump profile i
//! │   × N       │      profile i feeds build i+1
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ final build │  P3: `<exe>-<config>`, PGO from the last profile
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │  final run  │  P4: the actual benchmark
//! └─────────────┘
//! ```
//!
//! `prepare-native-image` stops after P3, `run-prepared-image` skips P1-P3;
//! both use the same deterministic directory so the halves can run on
//! different machines.
//!
//! ## Modules
//!
//! - [`layout`] - Output directory and every path derived from it
//! - [`commands`] - Assembly of each external command
//! - [`controller`] - Phase sequencing and failure policy

mod commands;
mod controller;
mod layout;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::CommandSet;
pub use controller::{FinalRun, NativeImagePipeline, Phase, PipelineReport, StepRecord};
pub use layout::{PROFILE_EXTENSION, RunLayout};

use serde::{Deserialize, Serialize};

/// Per-VM settings of the native-image pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NativeImageOptions {
    /// Instrumentation cycles unless overridden by `instrumentation-iteration-num`
    pub pgo_instrumented_iterations: usize,
    /// Add `-H:+InlineAllExplored` to instrumented builds
    pub pgo_inline_explored: bool,
    /// `-H:+EnablePGOContextSensitivity` or `-H:-EnablePGOContextSensitivity`
    pub pgo_context_sensitive: bool,
    /// Collect the profile on the managed runtime; disables the instrumentation loop
    pub hotspot_pgo: bool,
    /// Assertions and verification everywhere; every non-zero exit is fatal
    pub gate: bool,
    /// Use the LLVM backend
    pub llvm: bool,
}
