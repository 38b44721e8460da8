//! Test doubles for the pipeline
//!
//! [`FakeToolchainRunner`] records every command and writes the files the real
//! tools would produce, so phases that look for images or profiles behave as
//! they do against a real toolchain.

use crate::runner::{ProcessOutput, ProcessRunner, RunnerError, Sink, quote_command};
use imagebench_core::BENCHMARK_DIRECTIVE_PREFIX;
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::{Path, PathBuf};

/// `-Dnative-image.benchmark.<body>`
pub(crate) fn directive(body: &str) -> String {
    format!("{}{}", BENCHMARK_DIRECTIVE_PREFIX, body)
}

fn value_of<'a>(command: &'a [String], prefix: &str) -> Option<&'a str> {
    command.iter().find_map(|arg| arg.strip_prefix(prefix))
}

fn append_line(sink: &Sink, line: &str) {
    if let Sink::Append(path) = sink {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        writeln!(file, "{}", line).unwrap();
    }
}

/// Pretends to be `java`, `native-image` and the built images
#[derive(Default)]
pub(crate) struct FakeToolchainRunner {
    commands: RefCell<Vec<Vec<String>>>,
    failing_builds: Cell<usize>,
}

impl FakeToolchainRunner {
    /// The next `count` image builds exit with code 1 and produce nothing
    pub(crate) fn fail_builds(&self, count: usize) {
        self.failing_builds.set(count);
    }

    /// Every command run so far
    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.commands.borrow().clone()
    }

    fn simulate(&self, command: &[String], stdout: &Sink) -> i32 {
        let program = Path::new(&command[0]);
        let is_build = program.ends_with("native-image");

        if is_build && self.failing_builds.get() > 0 {
            self.failing_builds.set(self.failing_builds.get() - 1);
            return 1;
        }

        if is_build {
            if let (Some(dir), Some(name)) = (value_of(command, "-H:Path="), value_of(command, "-H:Name=")) {
                std::fs::write(PathBuf::from(dir).join(name), "image").unwrap();
            }
        }
        if let Some(dir) = value_of(command, "-agentlib:native-image-agent=config-output-dir=") {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(Path::new(dir).join("reflect-config.json"), "[]").unwrap();
        }
        if let Some(profile) = value_of(command, "-XX:ProfilesDumpFile=") {
            std::fs::write(profile, "profile").unwrap();
        }
        if let Some(profile) = value_of(command, "-Dgraal.PGOInstrument=") {
            std::fs::write(profile, "profile").unwrap();
        }
        append_line(stdout, &quote_command(command));
        0
    }
}

impl ProcessRunner for FakeToolchainRunner {
    fn run(
        &self,
        command: &[String],
        stdout: &Sink,
        _stderr: &Sink,
        _cwd: &Path,
        fail_on_nonzero: bool,
    ) -> Result<ProcessOutput, RunnerError> {
        if command.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        self.commands.borrow_mut().push(command.to_vec());

        let exit_code = self.simulate(command, stdout);
        if fail_on_nonzero && exit_code != 0 {
            return Err(RunnerError::NonZeroExit {
                command: quote_command(command),
                code: exit_code,
            });
        }

        let captured = if *stdout == Sink::Capture {
            "benchmark output\n".to_string()
        } else {
            String::new()
        };
        Ok(ProcessOutput {
            exit_code,
            stdout: captured,
            stderr: String::new(),
        })
    }
}
