//! Pipeline Controller
//!
//! Sequences the phases of a native-image benchmark run. Everything is
//! strictly sequential: each step consumes files written by the step before
//! it (agent configuration, profile of the previous iteration).
//!
//! ## Failure Policy
//!
//! - Gate mode or an explicit fatal request: the first non-zero exit aborts the
//!   run with [`RunnerError::NonZeroExit`].
//! - Otherwise the failure is logged and the pipeline carries on, since later
//!   phases may still produce useful output.
//! - A missing final image is reported as [`FinalRun::MissingImage`], never as
//!   an error.

use super::NativeImageOptions;
use super::commands::CommandSet;
use super::layout::RunLayout;
use crate::error::PipelineError;
use crate::runner::{ProcessOutput, RunnerError, Sink, quote_command};
use crate::vm::Host;
use imagebench_core::{PipelineMode, PreparedInvocation};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// File logged after the agent run
const REFLECT_CONFIG_FILE: &str = "reflect-config.json";

/// A pipeline step that runs an external process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "phase", content = "iteration")]
pub enum Phase {
    /// Managed-runtime run with agent and/or profiling
    AgentRun,
    /// Build of an instrumentation image
    InstrumentBuild(usize),
    /// Run of an instrumentation image
    InstrumentRun(usize),
    /// Build of the final image
    FinalBuild,
    /// The benchmark run
    FinalRun,
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Which step
    pub phase: Phase,
    /// The full command line
    pub command: Vec<String>,
    /// Exit code; -1 when the process could not be started or was killed
    pub exit_code: i32,
}

/// What happened in the final phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum FinalRun {
    /// The final image ran
    Executed {
        /// Exit code of the benchmark
        exit_code: i32,
        /// Size of the final image in bytes
        image_size: Option<u64>,
    },
    /// `prepare-native-image` stops before running
    Skipped,
    /// The final image was not found
    MissingImage {
        /// Where it was expected
        path: PathBuf,
    },
}

/// Result of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Directory holding every artifact of the run
    pub output_dir: PathBuf,
    /// Path of the final image
    pub final_image: PathBuf,
    /// Profile consumed by the final build, if any
    pub profile: Option<PathBuf>,
    /// Completed instrumentation iterations
    pub instrumentation_iterations: usize,
    /// Every external step in execution order
    pub steps: Vec<StepRecord>,
    /// Outcome of the final phase
    pub final_run: FinalRun,
    /// Combined stdout and stderr of the final run
    #[serde(skip)]
    pub output: String,
}

impl PipelineReport {
    /// Exit code of the benchmark; when it did not run, the last non-zero
    /// exit of any step, or 0
    pub fn exit_code(&self) -> i32 {
        match self.final_run {
            FinalRun::Executed { exit_code, .. } => exit_code,
            _ => self
                .steps
                .iter()
                .rev()
                .map(|step| step.exit_code)
                .find(|code| *code != 0)
                .unwrap_or(0),
        }
    }
}

/// Mutable state threaded through the phases
struct RunState {
    steps: Vec<StepRecord>,
    /// Latest profile written; each iteration replaces it
    profile: Option<PathBuf>,
    instrumented: usize,
}

/// Drives one invocation through the phases
pub struct NativeImagePipeline<'h> {
    host: &'h Host<'h>,
    options: NativeImageOptions,
    config_name: &'h str,
    fail_on_nonzero: bool,
}

impl<'h> NativeImagePipeline<'h> {
    /// A pipeline building images named after `config_name`.
    ///
    /// `fatal` makes every non-zero exit abort the run; gate mode implies it.
    pub fn new(host: &'h Host<'h>, options: NativeImageOptions, config_name: &'h str, fatal: bool) -> Self {
        Self {
            host,
            options,
            config_name,
            fail_on_nonzero: options.gate || fatal,
        }
    }

    /// Run all phases the invocation's mode asks for
    pub fn run(&self, invocation: &PreparedInvocation) -> Result<PipelineReport, PipelineError> {
        let config = &invocation.config;
        let layout = self.resolve_layout(invocation)?;
        info!(
            "Native image benchmark {} in {}",
            layout.final_image_name(),
            layout.output_dir().display()
        );

        let mut commands = CommandSet::new(self.host.toolchain, self.options, invocation, &layout);
        let mut state = RunState {
            steps: Vec::new(),
            profile: None,
            instrumented: 0,
        };

        if config.mode != PipelineMode::RunPreparedOnly {
            self.agent_phase(invocation, &layout, &mut commands, &mut state)?;
            self.instrumentation_phase(invocation, &layout, &commands, &mut state)?;
            self.final_build_phase(&commands, &mut state)?;
        }

        let (final_run, output) = if config.mode == PipelineMode::PrepareOnly {
            info!(
                "Prepared {} for a later run-prepared-image invocation",
                layout.final_image_path().display()
            );
            (FinalRun::Skipped, String::new())
        } else {
            self.final_run_phase(&layout, &commands, &mut state)?
        };

        let profile = if state.instrumented > 0 || self.options.hotspot_pgo {
            state.profile
        } else {
            None
        };

        Ok(PipelineReport {
            output_dir: layout.output_dir().to_path_buf(),
            final_image: layout.final_image_path(),
            profile,
            instrumentation_iterations: state.instrumented,
            steps: state.steps,
            final_run,
            output,
        })
    }

    /// P0: pick the output directory
    fn resolve_layout(&self, invocation: &PreparedInvocation) -> Result<RunLayout, PipelineError> {
        let fs = self.host.fs;
        let config = &invocation.config;
        let name = &invocation.executable_name;

        let output_dir = match config.mode {
            PipelineMode::PrepareOnly | PipelineMode::RunPreparedOnly => {
                let root = self.host.cwd.join(&self.host.prepared_root);
                let dir = RunLayout::prepared_dir(&root, name, self.config_name);
                if config.mode == PipelineMode::PrepareOnly {
                    if fs.exists(&dir) {
                        debug!("Removing previous preparation in {}", dir.display());
                        fs.remove_dir_all(&dir)
                            .map_err(|e| PipelineError::io("remove", &dir, e))?;
                    }
                    fs.create_dir_all(&dir)
                        .map_err(|e| PipelineError::io("create", &dir, e))?;
                }
                dir
            }
            PipelineMode::Full => {
                let parent = config
                    .benchmark_output_dir
                    .as_ref()
                    .map(|dir| self.host.cwd.join(dir));
                if let Some(parent) = &parent {
                    fs.create_dir_all(parent)
                        .map_err(|e| PipelineError::io("create", parent, e))?;
                }
                let suffix = RunLayout::temp_dir_suffix(name);
                fs.unique_dir("native-image", &suffix, parent.as_deref())
                    .map_err(|e| {
                        let location = parent.clone().unwrap_or_else(std::env::temp_dir);
                        PipelineError::io("allocate a directory in", &location, e)
                    })?
            }
        };

        Ok(RunLayout::new(output_dir, name, self.config_name))
    }

    /// P1: agent configuration and/or managed-runtime profiling
    fn agent_phase(
        &self,
        invocation: &PreparedInvocation,
        layout: &RunLayout,
        commands: &mut CommandSet<'_>,
        state: &mut RunState,
    ) -> Result<(), PipelineError> {
        let config = &invocation.config;
        let needs_config = config.config_dir.is_none() && config.needs_config;

        let config_dir = if needs_config {
            Some(layout.agent_config_dir())
        } else {
            config.config_dir.as_ref().map(|dir| self.host.cwd.join(dir))
        };
        commands.set_config_dir(config_dir.clone());

        if !needs_config && !self.options.hotspot_pgo {
            debug!("Configuration provided and no profiling requested, skipping agent run");
            return Ok(());
        }

        let agent_output = if needs_config { config_dir.as_deref() } else { None };
        let profile = self.options.hotspot_pgo.then(|| layout.profile_path(0));
        let command = commands.agent_run(agent_output, profile.as_deref());

        let (stdout_log, stderr_log) = layout.hotspot_logs();
        info!("Running on the managed runtime to collect configuration and profiles. This could take a while...");
        info!("Command: {}", quote_command(&command));
        info!("The standard output is saved to {}", stdout_log.display());
        info!("The standard error is saved to {}", stderr_log.display());

        let output = self.invoke(
            Phase::AgentRun,
            command,
            Sink::Append(stdout_log),
            Sink::Append(stderr_log),
            state,
        )?;
        info!("Managed runtime run finished with exit code {}", output.exit_code);

        if profile.is_some() {
            state.profile = profile;
        }
        if let Some(dir) = &config_dir {
            self.log_reflect_config(dir);
        }
        Ok(())
    }

    /// Log the collected reflection configuration; its absence only warns
    fn log_reflect_config(&self, config_dir: &Path) -> Option<String> {
        let path = config_dir.join(REFLECT_CONFIG_FILE);
        match self.host.fs.read_to_string(&path) {
            Ok(content) => {
                info!("The content of {} is:", REFLECT_CONFIG_FILE);
                info!("{}", content);
                Some(content)
            }
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// P2: instrumented build + run cycles, each feeding the next
    fn instrumentation_phase(
        &self,
        invocation: &PreparedInvocation,
        layout: &RunLayout,
        commands: &CommandSet<'_>,
        state: &mut RunState,
    ) -> Result<(), PipelineError> {
        let iterations = invocation
            .config
            .instrumentation_iterations
            .unwrap_or(self.options.pgo_instrumented_iterations);

        if self.options.hotspot_pgo {
            if iterations > 0 {
                debug!("Profiles come from the managed runtime, skipping {} instrumentation iteration(s)", iterations);
            }
            return Ok(());
        }

        for iteration in 0..iterations {
            let build = commands.instrument_build(iteration, state.profile.as_deref());
            info!("Building the instrumentation image with:");
            info!(" {}", quote_command(&build));
            self.invoke(
                Phase::InstrumentBuild(iteration),
                build,
                Sink::Inherit,
                Sink::Inherit,
                state,
            )?;

            let profile = layout.profile_path(iteration);
            let run = commands.instrument_run(iteration, &profile);
            let (stdout_log, stderr_log) = layout.instrumentation_logs(iteration);
            info!("Running the instrumented image with:");
            info!(" {}", quote_command(&run));
            info!("The standard output is saved to {}", stdout_log.display());
            info!("The standard error is saved to {}", stderr_log.display());
            self.invoke(
                Phase::InstrumentRun(iteration),
                run,
                Sink::Append(stdout_log),
                Sink::Append(stderr_log),
                state,
            )?;

            state.profile = Some(profile);
            state.instrumented += 1;

            let image = layout.image_path(&layout.instrumentation_image_name(iteration));
            self.log_image_size("Produced", &image);
        }
        Ok(())
    }

    /// P3: the optimized image
    fn final_build_phase(&self, commands: &CommandSet<'_>, state: &mut RunState) -> Result<(), PipelineError> {
        let profile = if state.instrumented > 0 || self.options.hotspot_pgo {
            state.profile.clone()
        } else {
            None
        };

        let build = commands.final_build(profile.as_deref());
        info!("Building the final image with:");
        info!(" {}", quote_command(&build));
        self.invoke(Phase::FinalBuild, build, Sink::Inherit, Sink::Inherit, state)?;
        Ok(())
    }

    /// P4: the benchmark
    fn final_run_phase(
        &self,
        layout: &RunLayout,
        commands: &CommandSet<'_>,
        state: &mut RunState,
    ) -> Result<(FinalRun, String), PipelineError> {
        let image = layout.final_image_path();
        if !self.host.fs.exists(&image) {
            error!("Image {} doesn't exist", image.display());
            return Ok((FinalRun::MissingImage { path: image }, String::new()));
        }

        let run = commands.final_run();
        info!("Running the produced native executable with:");
        info!(" {}", quote_command(&run));
        let output = self.invoke(Phase::FinalRun, run, Sink::Capture, Sink::Capture, state)?;
        let image_size = self.log_image_size("Final", &image);

        Ok((
            FinalRun::Executed {
                exit_code: output.exit_code,
                image_size,
            },
            output.combined(),
        ))
    }

    fn log_image_size(&self, which: &str, image: &Path) -> Option<u64> {
        match self.host.fs.file_size(image) {
            Ok(size) => {
                info!("{} image size is {} B", which, size);
                Some(size)
            }
            Err(e) => {
                warn!("Could not determine size of {}: {}", image.display(), e);
                None
            }
        }
    }

    /// Run one step and apply the failure policy
    fn invoke(
        &self,
        phase: Phase,
        command: Vec<String>,
        stdout: Sink,
        stderr: Sink,
        state: &mut RunState,
    ) -> Result<ProcessOutput, PipelineError> {
        let result = self.host.runner.run(
            &command,
            &stdout,
            &stderr,
            &self.host.cwd,
            self.fail_on_nonzero,
        );

        let output = match result {
            Ok(output) => output,
            Err(e) if self.fail_on_nonzero => return Err(e.into()),
            Err(RunnerError::NonZeroExit { code, .. }) => ProcessOutput {
                exit_code: code,
                ..ProcessOutput::default()
            },
            Err(e) => {
                error!("{:?} failed: {}", phase, e);
                ProcessOutput {
                    exit_code: -1,
                    ..ProcessOutput::default()
                }
            }
        };

        if !output.success() {
            warn!(
                "{:?} exited with code {}, continuing: {}",
                phase,
                output.exit_code,
                quote_command(&command)
            );
        }

        state.steps.push(StepRecord {
            phase,
            command,
            exit_code: output.exit_code,
        });
        Ok(output)
    }
}
