//! Command Assembly
//!
//! Builds the exact argument vector of every external step from the prepared
//! invocation, the VM options and the run layout. Pure: nothing here touches
//! the filesystem, so the same inputs always yield the same commands.

use super::NativeImageOptions;
use super::layout::RunLayout;
use crate::toolchain::Toolchain;
use imagebench_core::PreparedInvocation;
use std::path::{Path, PathBuf};

const GATE_RUNTIME_ARGS: &[&str] = &["-ea", "-esa"];
const GATE_BUILD_ARGS: &[&str] = &[
    "-J-ea",
    "-J-esa",
    "-H:+VerifyGraalGraphs",
    "-H:+VerifyPhases",
    "-H:+TraceClassInitialization",
];
const LLVM_BUILD_ARGS: &[&str] = &[
    "-H:CompilerBackend=llvm",
    "-H:Features=org.graalvm.home.HomeFinderFeature",
];

fn path_arg(prefix: &str, path: &Path) -> String {
    format!("{}{}", prefix, path.display())
}

fn owned(args: &[&str]) -> impl Iterator<Item = String> {
    args.iter().map(|a| a.to_string())
}

/// Command factory for one pipeline run
#[derive(Debug, Clone)]
pub struct CommandSet<'a> {
    toolchain: &'a Toolchain,
    options: NativeImageOptions,
    invocation: &'a PreparedInvocation,
    layout: &'a RunLayout,
    config_dir: Option<PathBuf>,
}

impl<'a> CommandSet<'a> {
    /// Commands for `invocation` laid out in `layout`
    pub fn new(
        toolchain: &'a Toolchain,
        options: NativeImageOptions,
        invocation: &'a PreparedInvocation,
        layout: &'a RunLayout,
    ) -> Self {
        Self {
            toolchain,
            options,
            invocation,
            layout,
            config_dir: None,
        }
    }

    /// Configuration directory passed to every image build from now on
    pub fn set_config_dir(&mut self, dir: Option<PathBuf>) {
        self.config_dir = dir;
    }

    /// Configuration directory used by image builds
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Managed-runtime run with the configuration agent attached and/or
    /// profiling enabled.
    pub fn agent_run(&self, agent_output: Option<&Path>, profile: Option<&Path>) -> Vec<String> {
        let config = &self.invocation.config;
        let classified = &self.invocation.classified;

        let mut cmd = vec![self.toolchain.java().display().to_string()];
        if self.options.gate {
            cmd.extend(owned(GATE_RUNTIME_ARGS));
        }
        if let Some(dir) = agent_output {
            cmd.push(path_arg("-agentlib:native-image-agent=config-output-dir=", dir));
            cmd.push("-XX:-UseJVMCINativeLibrary".to_string());
        }
        if let Some(profile) = profile {
            cmd.push(path_arg("-Dgraal.PGOInstrument=", profile));
        }
        cmd.extend(classified.system_properties.iter().cloned());
        cmd.extend(classified.image_vm_args.iter().cloned());
        cmd.extend(classified.classpath_args.iter().cloned());
        cmd.extend(self.invocation.executable().iter().cloned());

        let run_args = if profile.is_some()
            && !self.options.gate
            && !config.extra_agent_profile_run_args.is_empty()
        {
            &config.extra_agent_profile_run_args
        } else if !config.extra_agent_run_args.is_empty() {
            &config.extra_agent_run_args
        } else {
            &self.invocation.benchmark.post_executable_args
        };
        cmd.extend(run_args.iter().cloned());
        cmd
    }

    /// Arguments shared by every image build
    fn base_build(&self) -> Vec<String> {
        let classified = &self.invocation.classified;

        let mut cmd = vec![
            self.toolchain.native_image().display().to_string(),
            "--no-fallback".to_string(),
            "--no-server".to_string(),
        ];
        if self.options.gate {
            cmd.extend(owned(GATE_BUILD_ARGS));
        }
        cmd.extend(classified.system_properties.iter().cloned());
        cmd.extend(classified.classpath_args.iter().cloned());
        cmd.extend(self.invocation.executable().iter().cloned());
        cmd.push(path_arg("-H:Path=", self.layout.output_dir()));
        if let Some(dir) = &self.config_dir {
            cmd.push(path_arg("-H:ConfigurationFileDirectories=", dir));
        }
        if self.options.llvm {
            cmd.extend(owned(LLVM_BUILD_ARGS));
        }
        cmd.extend(self.invocation.config.extra_image_build_args.iter().cloned());
        cmd
    }

    fn pgo_args(&self, profile: &Path, image_name: &str) -> Vec<String> {
        vec![
            path_arg("--pgo=", profile),
            "-H:+VerifyPGOProfiles".to_string(),
            path_arg(
                "-H:VerificationDumpFile=",
                &self.layout.verification_dump_path(image_name),
            ),
        ]
    }

    /// Build of instrumentation image `iteration`; from the second iteration
    /// on it consumes the previous profile
    pub fn instrument_build(&self, iteration: usize, previous_profile: Option<&Path>) -> Vec<String> {
        let image_name = self.layout.instrumentation_image_name(iteration);

        let mut cmd = self.base_build();
        cmd.push(format!("-H:Name={}", image_name));
        cmd.push("--pgo-instrument".to_string());
        if let Some(profile) = previous_profile.filter(|_| iteration > 0) {
            cmd.extend(self.pgo_args(profile, &image_name));
        }
        if self.options.pgo_inline_explored {
            cmd.push("-H:+InlineAllExplored".to_string());
        }
        let sign = if self.options.pgo_context_sensitive { '+' } else { '-' };
        cmd.push(format!("-H:{}EnablePGOContextSensitivity", sign));
        cmd
    }

    /// Run of instrumentation image `iteration`, dumping its profile to `profile_out`
    pub fn instrument_run(&self, iteration: usize, profile_out: &Path) -> Vec<String> {
        let config = &self.invocation.config;
        let image = self
            .layout
            .image_path(&self.layout.instrumentation_image_name(iteration));

        let mut cmd = vec![
            image.display().to_string(),
            path_arg("-XX:ProfilesDumpFile=", profile_out),
        ];
        if !config.extra_profile_run_args.is_empty() {
            cmd.extend(config.extra_profile_run_args.iter().cloned());
        } else {
            cmd.extend(self.invocation.image_run_args());
            cmd.extend(config.extra_run_args.iter().cloned());
        }
        cmd
    }

    /// Build of the final image, optimized with `profile` when given
    pub fn final_build(&self, profile: Option<&Path>) -> Vec<String> {
        let image_name = self.layout.final_image_name();

        let mut cmd = self.base_build();
        cmd.push(format!("-H:Name={}", image_name));
        if let Some(profile) = profile {
            cmd.extend(self.pgo_args(profile, image_name));
        }
        cmd
    }

    /// The benchmark run itself
    pub fn final_run(&self) -> Vec<String> {
        let mut cmd = vec![self.layout.final_image_path().display().to_string()];
        cmd.extend(self.invocation.image_run_args());
        cmd.extend(self.invocation.config.extra_run_args.iter().cloned());
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagebench_core::prepare_invocation;

    fn prepared(args: &[&str]) -> PreparedInvocation {
        prepare_invocation(args).unwrap()
    }

    fn layout(invocation: &PreparedInvocation) -> RunLayout {
        RunLayout::new("/out", &invocation.executable_name, "default-ce")
    }

    #[test]
    fn test_agent_run_collects_config() {
        let toolchain = Toolchain::new("/gvm");
        let invocation = prepared(&["-Dk=v", "-Xmx1g", "-cp", "app.jar", "Main", "42"]);
        let layout = layout(&invocation);
        let commands = CommandSet::new(&toolchain, NativeImageOptions::default(), &invocation, &layout);

        let cmd = commands.agent_run(Some(Path::new("/out/config")), None);
        assert_eq!(
            cmd,
            vec![
                "/gvm/bin/java",
                "-agentlib:native-image-agent=config-output-dir=/out/config",
                "-XX:-UseJVMCINativeLibrary",
                "-Dk=v",
                "-Xmx1g",
                "-cp",
                "app.jar",
                "Main",
                "42",
            ]
        );
    }

    #[test]
    fn test_agent_run_argument_overrides() {
        let toolchain = Toolchain::new("/gvm");
        let invocation = prepared(&[
            "-Dnative-image.benchmark.extra-agent-run-arg=agent",
            "-Dnative-image.benchmark.extra-agent-profile-run-arg=profile",
            "Main",
            "42",
        ]);
        let layout = layout(&invocation);
        let profile = layout.profile_path(0);

        let options = NativeImageOptions {
            hotspot_pgo: true,
            ..NativeImageOptions::default()
        };
        let commands = CommandSet::new(&toolchain, options, &invocation, &layout);
        let cmd = commands.agent_run(None, Some(&profile));
        assert!(cmd.contains(&"-Dgraal.PGOInstrument=/out/main.iprof".to_string()));
        assert_eq!(cmd.last().map(String::as_str), Some("profile"));

        // Without profiling the agent-only override applies
        let cmd = commands.agent_run(Some(Path::new("/out/config")), None);
        assert_eq!(cmd.last().map(String::as_str), Some("agent"));

        // Gate mode ignores the profile override
        let gate = NativeImageOptions { gate: true, ..options };
        let commands = CommandSet::new(&toolchain, gate, &invocation, &layout);
        let cmd = commands.agent_run(None, Some(&profile));
        assert_eq!(&cmd[1..3], ["-ea", "-esa"]);
        assert_eq!(cmd.last().map(String::as_str), Some("agent"));
    }

    #[test]
    fn test_final_build_without_profile() {
        let toolchain = Toolchain::new("/gvm");
        let invocation = prepared(&[
            "-Dk=v",
            "-Dnative-image.benchmark.extra-image-build-argument=-O3",
            "-jar",
            "bench.jar",
        ]);
        let layout = layout(&invocation);
        let mut commands =
            CommandSet::new(&toolchain, NativeImageOptions::default(), &invocation, &layout);
        commands.set_config_dir(Some(PathBuf::from("/out/config")));

        assert_eq!(
            commands.final_build(None),
            vec![
                "/gvm/bin/native-image",
                "--no-fallback",
                "--no-server",
                "-Dk=v",
                "-jar",
                "bench.jar",
                "-H:Path=/out",
                "-H:ConfigurationFileDirectories=/out/config",
                "-O3",
                "-H:Name=bench-default-ce",
            ]
        );
    }

    #[test]
    fn test_final_build_with_profile() {
        let toolchain = Toolchain::new("/gvm");
        let invocation = prepared(&["Main"]);
        let layout = layout(&invocation);
        let options = NativeImageOptions {
            gate: true,
            llvm: true,
            ..NativeImageOptions::default()
        };
        let commands = CommandSet::new(&toolchain, options, &invocation, &layout);

        let cmd = commands.final_build(Some(Path::new("/out/main2.iprof")));
        assert!(cmd.contains(&"-H:+VerifyGraalGraphs".to_string()));
        assert!(cmd.contains(&"-H:CompilerBackend=llvm".to_string()));
        let tail = &cmd[cmd.len() - 4..];
        assert_eq!(
            tail,
            [
                "-H:Name=main-default-ce",
                "--pgo=/out/main2.iprof",
                "-H:+VerifyPGOProfiles",
                "-H:VerificationDumpFile=/out/main-default-ce-probabilities.log",
            ]
        );
    }

    #[test]
    fn test_instrument_build_chains_profiles() {
        let toolchain = Toolchain::new("/gvm");
        let invocation = prepared(&["Main"]);
        let layout = layout(&invocation);
        let options = NativeImageOptions {
            pgo_inline_explored: true,
            pgo_context_sensitive: false,
            ..NativeImageOptions::default()
        };
        let commands = CommandSet::new(&toolchain, options, &invocation, &layout);

        let first = commands.instrument_build(0, None);
        assert!(first.ends_with(&[
            "-H:Name=main-instrument".to_string(),
            "--pgo-instrument".to_string(),
            "-H:+InlineAllExplored".to_string(),
            "-H:-EnablePGOContextSensitivity".to_string(),
        ]));
        assert!(!first.iter().any(|a| a.starts_with("--pgo=")));

        let second = commands.instrument_build(1, Some(Path::new("/out/main.iprof")));
        assert!(second.contains(&"-H:Name=main-instrument1".to_string()));
        assert!(second.contains(&"--pgo=/out/main.iprof".to_string()));
        assert!(second.contains(
            &"-H:VerificationDumpFile=/out/main-instrument1-probabilities.log".to_string()
        ));
    }

    #[test]
    fn test_run_commands() {
        let toolchain = Toolchain::new("/gvm");
        let invocation = prepared(&[
            "-Xmx1g",
            "-Dnative-image.benchmark.extra-run-arg=--fast",
            "Main",
            "7",
        ]);
        let layout = layout(&invocation);
        let commands =
            CommandSet::new(&toolchain, NativeImageOptions::default(), &invocation, &layout);

        assert_eq!(
            commands.instrument_run(1, &layout.profile_path(1)),
            vec![
                "/out/main-instrument1",
                "-XX:ProfilesDumpFile=/out/main1.iprof",
                "-Xmx1g",
                "7",
                "--fast",
            ]
        );
        assert_eq!(
            commands.final_run(),
            vec!["/out/main-default-ce", "-Xmx1g", "7", "--fast"]
        );
    }

    #[test]
    fn test_profile_run_override_replaces_program_args() {
        let toolchain = Toolchain::new("/gvm");
        let invocation = prepared(&[
            "-Dnative-image.benchmark.extra-profile-run-arg=small",
            "-Dnative-image.benchmark.extra-run-arg=--fast",
            "Main",
            "7",
        ]);
        let layout = layout(&invocation);
        let commands =
            CommandSet::new(&toolchain, NativeImageOptions::default(), &invocation, &layout);

        assert_eq!(
            commands.instrument_run(0, &layout.profile_path(0)),
            vec!["/out/main-instrument", "-XX:ProfilesDumpFile=/out/main.iprof", "small"]
        );
    }
}
