//! `xcodebuild` builds for iOS and macOS.

use std::path::Path;

use forge_common::{ConfigLevel, Platform};

use crate::adapter::ToolchainAdapter;
use crate::error::ToolchainError;
use crate::request::{find_entries, first_with_extension, Artifacts, BuildRequest, CommandSpec};
use crate::runner::ProcessOutput;
use crate::validator::{DependencyValidator, ToolRequirement};

/// Derived data lives under the output directory so `.app` bundles land there.
const DERIVED_DATA: &str = "DerivedData";

/// Builds the first `.xcworkspace` or `.xcodeproj` in the platform directory.
#[derive(Debug, Clone, Copy)]
pub struct AppleAdapter {
    platform: Platform,
}

impl AppleAdapter {
    /// The iOS adapter (`-sdk iphoneos`).
    pub fn ios() -> Self {
        Self {
            platform: Platform::Ios,
        }
    }

    /// The macOS adapter (`-sdk macosx`).
    pub fn macos() -> Self {
        Self {
            platform: Platform::Macos,
        }
    }

    fn sdk(&self) -> &'static str {
        match self.platform {
            Platform::Ios => "iphoneos",
            _ => "macosx",
        }
    }
}

impl ToolchainAdapter for AppleAdapter {
    fn name(&self) -> &'static str {
        self.platform.as_str()
    }

    fn tools(&self, _request: &BuildRequest) -> Vec<ToolRequirement> {
        DependencyValidator::platform_tools(self.platform)
    }

    fn command(&self, request: &BuildRequest) -> Result<CommandSpec, ToolchainError> {
        let dir = request.platform_dir();
        let (flag, project) = match first_with_extension(&dir, "xcworkspace") {
            Some(ws) => ("-workspace", ws),
            None => match first_with_extension(&dir, "xcodeproj") {
                Some(proj) => ("-project", proj),
                None => {
                    return Err(ToolchainError::InvalidProject {
                        platform: self.name(),
                        dir,
                        reason: "no .xcworkspace or .xcodeproj found".into(),
                    })
                }
            },
        };

        let scheme = match request.option("scheme") {
            Some(scheme) => scheme.to_string(),
            None => project
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let configuration = match request.config.configuration {
            ConfigLevel::Debug => "Debug",
            ConfigLevel::Release => "Release",
        };

        Ok(CommandSpec::new("xcodebuild", &dir)
            .arg(flag)
            .arg(project.to_string_lossy())
            .args(["-scheme", scheme.as_str(), "-configuration", configuration, "-sdk", self.sdk()])
            .arg("-derivedDataPath")
            .arg(request.output_dir.join(DERIVED_DATA).to_string_lossy())
            .arg("build"))
    }

    fn collect_artifacts(
        &self,
        request: &BuildRequest,
        _output: &ProcessOutput,
    ) -> Result<Artifacts, ToolchainError> {
        let products = request.output_dir.join(DERIVED_DATA).join("Build/Products");
        let is_bundle = |p: &Path| p.is_dir() && p.extension().is_some_and(|e| e == "app");
        let paths = find_entries(&products, &is_bundle)?
            .into_iter()
            .map(|p| Path::new(DERIVED_DATA).join("Build/Products").join(p))
            .collect();
        Ok(Artifacts::new(&request.output_dir, paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::BuildConfig;
    use std::path::PathBuf;

    #[test]
    fn ios_release_command_uses_project_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Demo.xcodeproj")).unwrap();
        let config = BuildConfig::new(Platform::Ios).with_configuration(ConfigLevel::Release);
        let req = BuildRequest::new("ios", dir.path(), vec![], config, dir.path().join("build/ios"));

        let spec = AppleAdapter::ios().command(&req).unwrap();
        assert_eq!(spec.program, "xcodebuild");
        assert_eq!(spec.args[0], "-project");
        let tail: Vec<&str> = spec.args[2..8].iter().map(String::as_str).collect();
        assert_eq!(tail, ["-scheme", "Demo", "-configuration", "Release", "-sdk", "iphoneos"]);
        assert_eq!(spec.args.last().map(String::as_str), Some("build"));
    }

    #[test]
    fn workspace_and_scheme_option_win() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Demo.xcodeproj")).unwrap();
        std::fs::create_dir(dir.path().join("Demo.xcworkspace")).unwrap();
        let config = BuildConfig::new(Platform::Macos).with_option("scheme", "DemoMac");
        let req = BuildRequest::new("mac", dir.path(), vec![], config, dir.path().join("build/mac"));

        let spec = AppleAdapter::macos().command(&req).unwrap();
        assert_eq!(spec.args[0], "-workspace");
        assert_eq!(spec.args[3], "DemoMac");
        assert!(spec.args.contains(&"macosx".to_string()));
    }

    #[test]
    fn missing_project_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let req = BuildRequest::new("ios", dir.path(), vec![], BuildConfig::new(Platform::Ios), dir.path());
        assert!(AppleAdapter::ios().command(&req).is_err());
    }

    #[test]
    fn collects_app_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("build/ios");
        let bundle = out.join("DerivedData/Build/Products/Debug-iphoneos/Demo.app");
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::write(bundle.join("Demo"), "bin").unwrap();

        let req = BuildRequest::new("ios", dir.path(), vec![], BuildConfig::new(Platform::Ios), &out);
        let output = ProcessOutput {
            exit_code: Some(0),
            success: true,
            stdout: vec![],
            stderr: vec![],
            duration: std::time::Duration::ZERO,
        };
        let artifacts = AppleAdapter::ios().collect_artifacts(&req, &output).unwrap();
        assert_eq!(artifacts.root, out);
        assert_eq!(
            artifacts.paths,
            vec![PathBuf::from("DerivedData/Build/Products/Debug-iphoneos/Demo.app")]
        );
    }
}
