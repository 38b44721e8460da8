//! Parse-time errors
//!
//! Every error in this module is raised before any external process runs, so a
//! malformed invocation never leaves partial output behind.

use thiserror::Error;

/// Errors produced while splitting, classifying or interpreting an invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// No non-flag token and no `-jar <path>` pair was found
    #[error("No executable found in args: {}", .args.join(" "))]
    NoExecutableFound {
        /// The full invocation that was scanned
        args: Vec<String>,
    },

    /// A VM flag that cannot be carried over to a native image
    #[error("Unsupported argument {arg}. Currently supported argument prefixes are: {}", .supported.join(", "))]
    UnsupportedArgument {
        /// The offending flag
        arg: String,
        /// The prefixes that would have been accepted
        supported: Vec<String>,
    },

    /// A `-Dnative-image.benchmark.` directive with an unknown key or a malformed value
    #[error("Invalid benchmark argument: {arg} ({reason})")]
    InvalidBenchmarkArgument {
        /// The directive as written on the command line
        arg: String,
        /// What was wrong with it
        reason: String,
    },

    /// Both `prepare-native-image` and `run-prepared-image` were enabled
    #[error(
        "Only one of the following options can be chosen: prepare-native-image, run-prepared-image"
    )]
    ConflictingModeFlags,

    /// A classpath option was the last token and has no value
    #[error("Option {option} expects a value")]
    MissingOptionValue {
        /// The option missing its value
        option: String,
    },
}
