//! Process Runner
//!
//! Every build and run step of the pipeline goes through [`ProcessRunner`].
//! [`SystemRunner`] spawns real processes and blocks until they exit;
//! [`DryRunner`] only logs what would have been executed.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command exited with code {code}: {command}")]
    NonZeroExit { command: String, code: i32 },
}

/// Where a child's output stream goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// Share the parent's stream
    Inherit,
    /// Discard
    Null,
    /// Append to a file, creating it if needed
    Append(PathBuf),
    /// Buffer in memory and return in [`ProcessOutput`]
    Capture,
}

/// Exit status and captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// Empty unless stdout was [`Sink::Capture`]
    pub stdout: String,
    /// Empty unless stderr was [`Sink::Capture`]
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Captured stdout followed by captured stderr
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Runs external commands to completion
pub trait ProcessRunner {
    /// Run `command` in `cwd` and wait for it to exit.
    ///
    /// With `fail_on_nonzero` a non-zero exit is returned as
    /// [`RunnerError::NonZeroExit`]; otherwise it is reported through
    /// [`ProcessOutput::exit_code`].
    fn run(
        &self,
        command: &[String],
        stdout: &Sink,
        stderr: &Sink,
        cwd: &Path,
        fail_on_nonzero: bool,
    ) -> Result<ProcessOutput, RunnerError>;
}

/// Quote a command for logs
pub fn quote_command(command: &[String]) -> String {
    shell_words::join(command)
}

fn stdio_for(sink: &Sink) -> Result<Stdio, RunnerError> {
    Ok(match sink {
        Sink::Inherit => Stdio::inherit(),
        Sink::Null => Stdio::null(),
        Sink::Capture => Stdio::piped(),
        Sink::Append(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| RunnerError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            Stdio::from(file)
        }
    })
}

/// Spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        command: &[String],
        stdout: &Sink,
        stderr: &Sink,
        cwd: &Path,
        fail_on_nonzero: bool,
    ) -> Result<ProcessOutput, RunnerError> {
        let (program, args) = command.split_first().ok_or(RunnerError::EmptyCommand)?;

        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(stdio_for(stdout)?)
            .stderr(stdio_for(stderr)?)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Reads both pipes concurrently, so a chatty stderr cannot block stdout
        let output = child.wait_with_output()?;

        // Killed by a signal
        let exit_code = output.status.code().unwrap_or(-1);
        if fail_on_nonzero && exit_code != 0 {
            return Err(RunnerError::NonZeroExit {
                command: quote_command(command),
                code: exit_code,
            });
        }

        Ok(ProcessOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Logs commands instead of running them; every command "succeeds"
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunner;

impl ProcessRunner for DryRunner {
    fn run(
        &self,
        command: &[String],
        _stdout: &Sink,
        _stderr: &Sink,
        cwd: &Path,
        _fail_on_nonzero: bool,
    ) -> Result<ProcessOutput, RunnerError> {
        if command.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        info!("[dry-run] in {}: {}", cwd.display(), quote_command(command));
        Ok(ProcessOutput::default())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_capture_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let output = SystemRunner
            .run(
                &sh("echo out; echo err >&2"),
                &Sink::Capture,
                &Sink::Capture,
                dir.path(),
                false,
            )
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[test]
    fn test_append_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        for _ in 0..2 {
            SystemRunner
                .run(
                    &sh("echo line"),
                    &Sink::Append(log.clone()),
                    &Sink::Null,
                    dir.path(),
                    false,
                )
                .unwrap();
        }
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "line\nline\n");
    }

    #[test]
    fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let output = SystemRunner
            .run(&sh("exit 3"), &Sink::Null, &Sink::Null, dir.path(), false)
            .unwrap();
        assert_eq!(output.exit_code, 3);

        let err = SystemRunner
            .run(&sh("exit 3"), &Sink::Null, &Sink::Null, dir.path(), true)
            .unwrap_err();
        assert!(matches!(err, RunnerError::NonZeroExit { code: 3, .. }));
    }

    #[test]
    fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        let output = SystemRunner
            .run(&sh("ls"), &Sink::Capture, &Sink::Null, dir.path(), true)
            .unwrap();
        assert!(output.stdout.contains("marker"));
    }

    #[test]
    fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = SystemRunner
            .run(
                &["/definitely/not/a/binary".to_string()],
                &Sink::Null,
                &Sink::Null,
                dir.path(),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[test]
    fn test_dry_runner_does_not_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let output = DryRunner
            .run(&sh("exit 1"), &Sink::Null, &Sink::Null, dir.path(), true)
            .unwrap();
        assert!(output.success());
        assert!(DryRunner.run(&[], &Sink::Null, &Sink::Null, dir.path(), true).is_err());
    }
}
