//! Invocation Splitting and Classification
//!
//! A managed-runtime command line has the shape
//!
//! ```text
//! [vm flags...] <executable selector> [program args...]
//! ```
//!
//! where the selector is either a main class or `-jar <path>`. The splitter
//! finds the selector, the classifier then sorts the VM flags into the buckets a
//! native-image build understands.

use crate::error::ArgumentError;
use serde::Serialize;
use std::path::Path;

/// Flag that turns the following token into the executable
pub const JAR_SELECTOR: &str = "-jar";

/// VM options whose value is passed as a separate token
pub const SPACE_SEPARATED_VM_OPTIONS: &[&str] = &[
    "-mp",
    "-modulepath",
    "-limitmods",
    "-addmods",
    "-upgrademodulepath",
    "-m",
    "--module-path",
    "--limit-modules",
    "--add-modules",
    "--upgrade-module-path",
    "--module",
    "--module-source-path",
    "--add-exports",
    "--add-reads",
    "--patch-module",
    "--boot-class-path",
    "--source-path",
    "-cp",
    "-classpath",
];

/// VM flag prefixes that can be carried over to a native image.
///
/// Intentionally restrictive: every entry has been checked to mean the same
/// thing for the image as for the managed runtime.
pub const SUPPORTED_VM_ARG_PREFIXES: &[&str] = &["-D", "-Xmx", "-Xmn", "-XX:-PrintGC", "-XX:+PrintGC"];

const PROPERTY_PREFIX: &str = "-D";
const LONG_CLASSPATH_PREFIX: &str = "--class-path";
const SHORT_CLASSPATH_PREFIXES: &[&str] = &["-cp", "-classpath"];

/// An invocation cut into VM flags, executable selector and program arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitInvocation {
    /// Flags before the executable
    pub pre_executable_flags: Vec<String>,
    /// `[main-class]` or `["-jar", path]`
    pub executable_selector: Vec<String>,
    /// Arguments for the program itself
    pub post_executable_args: Vec<String>,
}

impl SplitInvocation {
    /// Whether the executable is selected through `-jar`
    pub fn is_jar(&self) -> bool {
        self.executable_selector.first().map(String::as_str) == Some(JAR_SELECTOR)
    }

    /// Reassemble the invocation in its original order
    pub fn to_tokens(&self) -> Vec<String> {
        self.pre_executable_flags
            .iter()
            .chain(&self.executable_selector)
            .chain(&self.post_executable_args)
            .cloned()
            .collect()
    }

    /// Base name of the image built for this executable.
    ///
    /// For `-jar app.jar` this is the file stem (`app`), otherwise the main
    /// class. A benchmark name is appended as `-<name>`; the result is lowercased.
    pub fn executable_name(&self, benchmark_name: Option<&str>) -> String {
        let base = if self.is_jar() {
            let jar = self
                .executable_selector
                .get(1)
                .map(String::as_str)
                .unwrap_or_default();
            Path::new(jar)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| jar.to_string())
        } else {
            self.executable_selector.concat()
        };

        let name = match benchmark_name {
            Some(suffix) => format!("{}-{}", base, suffix),
            None => base,
        };
        name.to_lowercase()
    }
}

/// Split a flat argument list at the executable selector.
///
/// Scans left to right; `-jar` takes the following token with it, the first
/// token without a leading `-` is the selector, options listed in
/// [`SPACE_SEPARATED_VM_OPTIONS`] skip their value token.
pub fn split<S: AsRef<str>>(args: &[S]) -> Result<SplitInvocation, ArgumentError> {
    let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == JAR_SELECTOR {
            if i + 1 >= args.len() {
                break;
            }
            return Ok(cut(&args, i, i + 2));
        } else if !arg.starts_with('-') {
            return Ok(cut(&args, i, i + 1));
        } else if SPACE_SEPARATED_VM_OPTIONS.contains(&arg) {
            i += 2;
        } else {
            i += 1;
        }
    }

    Err(ArgumentError::NoExecutableFound { args })
}

fn cut(args: &[String], start: usize, end: usize) -> SplitInvocation {
    SplitInvocation {
        pre_executable_flags: args[..start].to_vec(),
        executable_selector: args[start..end].to_vec(),
        post_executable_args: args[end..].to_vec(),
    }
}

/// VM flags sorted into the buckets a native-image build consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifiedArgs {
    /// `--class-path=...`, or `-cp`/`-classpath` followed by their value
    pub classpath_args: Vec<String>,
    /// `-D` property definitions, passed to every invocation
    pub system_properties: Vec<String>,
    /// Remaining supported flags; forwarded to the image at run time
    pub image_vm_args: Vec<String>,
}

/// Classify the VM flags of an invocation.
///
/// Fails on the first flag that matches none of [`SUPPORTED_VM_ARG_PREFIXES`].
pub fn classify<S: AsRef<str>>(flags: &[S]) -> Result<ClassifiedArgs, ArgumentError> {
    let mut classified = ClassifiedArgs::default();

    let mut i = 0;
    while i < flags.len() {
        let flag = flags[i].as_ref();
        if flag.starts_with(LONG_CLASSPATH_PREFIX) {
            classified.classpath_args.push(flag.to_string());
            i += 1;
        } else if SHORT_CLASSPATH_PREFIXES.iter().any(|p| flag.starts_with(p)) {
            let value = flags
                .get(i + 1)
                .ok_or_else(|| ArgumentError::MissingOptionValue {
                    option: flag.to_string(),
                })?;
            classified.classpath_args.push(flag.to_string());
            classified.classpath_args.push(value.as_ref().to_string());
            i += 2;
        } else if flag.starts_with(PROPERTY_PREFIX) {
            classified.system_properties.push(flag.to_string());
            i += 1;
        } else if SUPPORTED_VM_ARG_PREFIXES.iter().any(|p| flag.starts_with(p)) {
            classified.image_vm_args.push(flag.to_string());
            i += 1;
        } else {
            return Err(ArgumentError::UnsupportedArgument {
                arg: flag.to_string(),
                supported: SUPPORTED_VM_ARG_PREFIXES
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
            });
        }
    }

    Ok(classified)
}
