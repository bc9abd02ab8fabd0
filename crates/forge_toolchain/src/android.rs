//! Gradle wrapper builds for Android.

use std::path::Path;

use forge_common::{ConfigLevel, OptLevel, Platform};
use tracing::{debug, warn};

use crate::adapter::ToolchainAdapter;
use crate::error::ToolchainError;
use crate::request::{find_entries, Artifacts, BuildRequest, CommandSpec};
use crate::runner::ProcessOutput;
use crate::validator::{DependencyValidator, ToolRequirement};

/// Runs `gradlew assembleDebug` / `assembleRelease` and collects APKs and
/// app bundles from `app/build/outputs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AndroidAdapter;

fn gradle_wrapper() -> &'static str {
    if cfg!(windows) {
        "gradlew.bat"
    } else {
        "gradlew"
    }
}

impl ToolchainAdapter for AndroidAdapter {
    fn name(&self) -> &'static str {
        "android"
    }

    fn tools(&self, _request: &BuildRequest) -> Vec<ToolRequirement> {
        DependencyValidator::platform_tools(Platform::Android)
    }

    fn command(&self, request: &BuildRequest) -> Result<CommandSpec, ToolchainError> {
        let dir = request.platform_dir();
        let wrapper = dir.join(gradle_wrapper());
        if !wrapper.is_file() {
            return Err(ToolchainError::InvalidProject {
                platform: "android",
                dir,
                reason: format!("no {} found", gradle_wrapper()),
            });
        }

        let task = match request.config.configuration {
            ConfigLevel::Debug => "assembleDebug",
            ConfigLevel::Release => "assembleRelease",
        };
        let mut spec = CommandSpec::new(wrapper.to_string_lossy(), &dir).args([task, "--stacktrace"]);
        if request.option("parallel") != Some("false") {
            spec = spec.arg("--parallel");
        }
        spec = match request.config.optimization {
            OptLevel::Minimal => spec,
            OptLevel::Standard => spec.arg("--build-cache"),
            OptLevel::Aggressive => spec.args(["--build-cache", "--configure-on-demand"]),
        };
        Ok(spec)
    }

    fn collect_artifacts(
        &self,
        request: &BuildRequest,
        output: &ProcessOutput,
    ) -> Result<Artifacts, ToolchainError> {
        let warnings = output
            .stdout
            .iter()
            .filter(|line| line.to_lowercase().contains("warning"))
            .count();
        if warnings > 0 {
            debug!(target_name = %request.target, warnings, "gradle reported warnings");
        }

        let root = request.platform_dir().join("app/build/outputs");
        let release = request.config.configuration == ConfigLevel::Release;
        let matches = |path: &Path| {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if release {
                name.ends_with("-release.apk") || name.ends_with("-release.aab")
            } else {
                name.ends_with("-debug.apk")
            }
        };
        let paths = find_entries(&root, &matches)?;
        if paths.is_empty() {
            warn!(target_name = %request.target, dir = %root.display(), "gradle produced no packages");
        }
        Ok(Artifacts::new(root, paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::BuildConfig;
    use std::path::PathBuf;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(gradle_wrapper()), "#!/bin/sh\n").unwrap();
        dir
    }

    fn request(dir: &Path, config: BuildConfig) -> BuildRequest {
        BuildRequest::new("app", dir, vec![], config, dir.join("build/app"))
    }

    fn empty_output() -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            success: true,
            stdout: vec!["warning: deprecated api".into()],
            stderr: vec![],
            duration: std::time::Duration::ZERO,
        }
    }

    #[test]
    fn debug_command() {
        let dir = project();
        let spec = AndroidAdapter
            .command(&request(dir.path(), BuildConfig::new(Platform::Android)))
            .unwrap();
        assert!(spec.program.ends_with(gradle_wrapper()));
        assert_eq!(spec.args, vec!["assembleDebug", "--stacktrace", "--parallel", "--build-cache"]);
        assert_eq!(spec.cwd, dir.path());
    }

    #[test]
    fn release_aggressive_command() {
        let dir = project();
        let config = BuildConfig::new(Platform::Android)
            .with_configuration(ConfigLevel::Release)
            .with_optimization(OptLevel::Aggressive)
            .with_option("parallel", "false");
        let spec = AndroidAdapter.command(&request(dir.path(), config)).unwrap();
        assert_eq!(
            spec.args,
            vec!["assembleRelease", "--stacktrace", "--build-cache", "--configure-on-demand"]
        );
    }

    #[test]
    fn missing_wrapper_is_invalid_project() {
        let dir = tempfile::tempdir().unwrap();
        let err = AndroidAdapter
            .command(&request(dir.path(), BuildConfig::new(Platform::Android)))
            .unwrap_err();
        assert!(matches!(err, ToolchainError::InvalidProject { .. }));
    }

    #[test]
    fn collects_matching_packages() {
        let dir = project();
        let apk_dir = dir.path().join("app/build/outputs/apk");
        std::fs::create_dir_all(apk_dir.join("debug")).unwrap();
        std::fs::create_dir_all(apk_dir.join("release")).unwrap();
        std::fs::write(apk_dir.join("debug/app-debug.apk"), "d").unwrap();
        std::fs::write(apk_dir.join("release/app-release.apk"), "r").unwrap();

        let debug = AndroidAdapter
            .collect_artifacts(&request(dir.path(), BuildConfig::new(Platform::Android)), &empty_output())
            .unwrap();
        assert_eq!(debug.paths, vec![PathBuf::from("apk/debug/app-debug.apk")]);

        let release_config = BuildConfig::new(Platform::Android).with_configuration(ConfigLevel::Release);
        let release = AndroidAdapter
            .collect_artifacts(&request(dir.path(), release_config), &empty_output())
            .unwrap();
        assert_eq!(release.paths, vec![PathBuf::from("apk/release/app-release.apk")]);
    }
}
