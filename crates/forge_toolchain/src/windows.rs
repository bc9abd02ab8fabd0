//! `dotnet build` for Windows desktop targets.

use forge_common::{ConfigLevel, Platform};

use crate::adapter::ToolchainAdapter;
use crate::error::ToolchainError;
use crate::request::{first_with_extension, Artifacts, BuildRequest, CommandSpec};
use crate::runner::ProcessOutput;
use crate::validator::{DependencyValidator, ToolRequirement};

/// Builds the first `.csproj` (or `.sln`) straight into the output directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsAdapter;

impl ToolchainAdapter for WindowsAdapter {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn tools(&self, _request: &BuildRequest) -> Vec<ToolRequirement> {
        DependencyValidator::platform_tools(Platform::Windows)
    }

    fn command(&self, request: &BuildRequest) -> Result<CommandSpec, ToolchainError> {
        let dir = request.platform_dir();
        let project = first_with_extension(&dir, "csproj")
            .or_else(|| first_with_extension(&dir, "sln"))
            .ok_or_else(|| ToolchainError::InvalidProject {
                platform: "windows",
                dir: dir.clone(),
                reason: "no .csproj or .sln found".into(),
            })?;
        let configuration = match request.config.configuration {
            ConfigLevel::Debug => "Debug",
            ConfigLevel::Release => "Release",
        };
        Ok(CommandSpec::new("dotnet", &dir)
            .arg("build")
            .arg(project.to_string_lossy())
            .args(["-c", configuration, "-o"])
            .arg(request.output_dir.to_string_lossy()))
    }

    fn collect_artifacts(
        &self,
        request: &BuildRequest,
        _output: &ProcessOutput,
    ) -> Result<Artifacts, ToolchainError> {
        crate::custom::output_dir_contents(request)
    }
}
