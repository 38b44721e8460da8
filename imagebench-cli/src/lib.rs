#![warn(missing_docs)]
//! imagebench CLI Library
//!
//! Pipeline controller, VM variants and the `imagebench` command line.
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     if let Err(e) = imagebench_cli::run() {
//!         eprintln!("Error: {:#}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```

mod config;
mod error;
mod filesystem;
mod pipeline;
mod runner;
mod toolchain;
mod vm;

pub use config::*;
pub use error::PipelineError;
pub use filesystem::{DryRunFilesystem, Filesystem, LocalFilesystem};
pub use pipeline::{
    CommandSet, FinalRun, NativeImageOptions, NativeImagePipeline, PROFILE_EXTENSION, Phase,
    PipelineReport, RunLayout, StepRecord,
};
pub use runner::{
    DryRunner, ProcessOutput, ProcessRunner, RunnerError, Sink, SystemRunner, quote_command,
};
pub use toolchain::{HOME_ENV_VARS, Toolchain, ToolchainError};
pub use vm::{
    Host, ImageBuildLauncher, ImageBuildVm, NativeImageVm, RunOutcome, StandardVm,
    VERSION_FLAG, Vm, VmRegistry,
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use imagebench_core::prepare_invocation;
use std::io::Write;
use std::path::PathBuf;

/// imagebench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "imagebench")]
#[command(author, version, about = "imagebench - native-image benchmark orchestration")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file; defaults to the nearest imagebench.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a benchmark invocation on a VM
    Run(RunArgs),
    /// List the registered VMs
    List,
    /// Show how an invocation is split, classified and configured
    Split {
        /// The managed-runtime invocation
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Write a default imagebench.toml
    Init {
        /// Where to write it
        #[arg(default_value = CONFIG_FILE_NAME)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Arguments of `imagebench run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// VM name
    #[arg(long, default_value = "native-image")]
    pub vm: String,

    /// VM configuration; defaults to the first one registered under the name
    #[arg(long)]
    pub vm_config: Option<String>,

    /// Abort on the first non-zero exit of any step
    #[arg(long)]
    pub fatal: bool,

    /// Log commands instead of executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Working directory of every command
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Toolchain home, overriding the configuration
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Output format: human, json
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// The managed-runtime invocation, after `--`
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON of the whole [`RunOutcome`]
    Json,
    /// Benchmark output followed by a step summary
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Run the imagebench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success. A benchmark exiting non-zero terminates the
/// process with the same code.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the imagebench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("imagebench=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("imagebench=info")
            .init();
    }

    let config = match &cli.config {
        Some(path) => ImagebenchConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ImagebenchConfig::discover().unwrap_or_default(),
    };

    match cli.command {
        Commands::Run(ref args) => {
            let code = run_command(args, &config)?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::List => list_vms(&config),
        Commands::Split { ref args } => split_command(args)?,
        Commands::Init { ref path, force } => init_config(path, force)?,
    }

    Ok(())
}

/// Execute `imagebench run`; returns the benchmark's exit code
fn run_command(args: &RunArgs, config: &ImagebenchConfig) -> anyhow::Result<i32> {
    let format: OutputFormat = args
        .format
        .as_deref()
        .unwrap_or(&config.output.format)
        .parse()
        .unwrap_or(OutputFormat::Human);

    let cwd = std::env::current_dir()?;
    let cwd = match &args.cwd {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };

    let home = args.home.as_deref().or(config.toolchain.home.as_deref());
    // A dry run never spawns anything, so the home need not exist
    let toolchain = if args.dry_run {
        Toolchain::resolve(home)?
    } else {
        Toolchain::locate(home)?
    };

    let registry = VmRegistry::with_defaults(config);
    let vm = match &args.vm_config {
        Some(vm_config) => registry.get(&args.vm, vm_config),
        None => registry.iter().find(|vm| vm.name() == args.vm),
    }
    .with_context(|| {
        format!(
            "Unknown VM {}{}; see `imagebench list`",
            args.vm,
            args.vm_config.as_deref().map(|c| format!("/{}", c)).unwrap_or_default()
        )
    })?;

    // A dry run must leave the disk as it found it
    let (runner, fs): (Box<dyn ProcessRunner>, Box<dyn Filesystem>) = if args.dry_run {
        (Box::new(DryRunner), Box::new(DryRunFilesystem))
    } else {
        (Box::new(SystemRunner), Box::new(LocalFilesystem))
    };
    let host = Host {
        toolchain: &toolchain,
        runner: runner.as_ref(),
        fs: fs.as_ref(),
        cwd,
        prepared_root: config.output.prepared_root.clone(),
    };

    let outcome = vm.run(&host, &args.args, args.fatal)?;

    let output = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&outcome)? + "\n",
        OutputFormat::Human => format_human_output(&outcome),
    };

    // Write output
    if let Some(ref path) = args.output {
        let mut file = std::fs::File::create(path)?;
        file.write_all(output.as_bytes())?;
        println!("Result written to: {}", path.display());
    } else {
        print!("{}", output);
    }

    Ok(outcome.exit_code)
}

/// Benchmark output followed by a summary of every step
pub fn format_human_output(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    out.push_str(&outcome.output);
    if !outcome.output.is_empty() && !outcome.output.ends_with('\n') {
        out.push('\n');
    }

    let vm = outcome.dimensions.get("host-vm").map(String::as_str).unwrap_or("?");
    let vm_config = outcome
        .dimensions
        .get("host-vm-config")
        .map(String::as_str)
        .unwrap_or("?");
    out.push_str(&format!("\nimagebench: {}/{}\n", vm, vm_config));

    if let Some(report) = &outcome.pipeline {
        out.push_str(&format!("├── output dir: {}\n", report.output_dir.display()));
        for step in &report.steps {
            let phase = match step.phase {
                Phase::AgentRun => "agent run".to_string(),
                Phase::InstrumentBuild(i) => format!("instrument build #{}", i),
                Phase::InstrumentRun(i) => format!("instrument run #{}", i),
                Phase::FinalBuild => "final build".to_string(),
                Phase::FinalRun => "final run".to_string(),
            };
            out.push_str(&format!("│   ├── {:<22} exit {}\n", phase, step.exit_code));
        }
        if let Some(profile) = &report.profile {
            out.push_str(&format!("├── profile: {}\n", profile.display()));
        }
        let final_run = match &report.final_run {
            FinalRun::Executed {
                image_size: Some(size),
                ..
            } => format!("{} ({} B)", report.final_image.display(), size),
            FinalRun::Executed { .. } => report.final_image.display().to_string(),
            FinalRun::Skipped => format!("{} (prepared, not run)", report.final_image.display()),
            FinalRun::MissingImage { path } => format!("{} (missing)", path.display()),
        };
        out.push_str(&format!("├── image: {}\n", final_run));
    }

    out.push_str(&format!(
        "└── exit code {} at {}\n",
        outcome.exit_code,
        outcome.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out
}

fn list_vms(config: &ImagebenchConfig) {
    println!("imagebench VMs:");
    let registry = VmRegistry::with_defaults(config);
    for vm in registry.iter() {
        println!("├── {}/{}", vm.name(), vm.config_name());
    }
    println!("{} VMs registered.", registry.len());
}

fn split_command(args: &[String]) -> anyhow::Result<()> {
    let invocation = prepare_invocation(args)?;
    println!("{}", serde_json::to_string_pretty(&invocation)?);
    Ok(())
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, ImagebenchConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
