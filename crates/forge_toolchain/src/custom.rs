//! Arbitrary commands from `forge.toml`.
//!
//! Arguments may contain `{output}`, `{configuration}` and `{target}`
//! placeholders. The child also receives the build context as `FORGE_*`
//! environment variables.

use std::path::PathBuf;

use crate::adapter::ToolchainAdapter;
use crate::error::ToolchainError;
use crate::request::{Artifacts, BuildRequest, CommandSpec};
use crate::runner::ProcessOutput;
use crate::validator::ToolRequirement;

/// Runs the target's configured command from the project directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomAdapter;

impl CustomAdapter {
    fn expand(arg: &str, request: &BuildRequest) -> String {
        arg.replace("{output}", &request.output_dir.to_string_lossy())
            .replace("{configuration}", request.config.configuration.as_str())
            .replace("{target}", &request.target)
    }
}

impl ToolchainAdapter for CustomAdapter {
    fn name(&self) -> &'static str {
        "custom"
    }

    fn tools(&self, request: &BuildRequest) -> Vec<ToolRequirement> {
        match request.command.first() {
            Some(program) => vec![ToolRequirement::required(
                program,
                &[],
                &format!("Install '{program}' and make sure it is on PATH"),
                "custom build",
            )],
            None => Vec::new(),
        }
    }

    fn command(&self, request: &BuildRequest) -> Result<CommandSpec, ToolchainError> {
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| ToolchainError::NoCommand {
                target: request.target.clone(),
            })?;

        let changed = request
            .changed_files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CommandSpec::new(Self::expand(program, request), &request.project_dir)
            .args(args.iter().map(|a| Self::expand(a, request)))
            .env("FORGE_OUTPUT_DIR", request.output_dir.to_string_lossy())
            .env("FORGE_CONFIGURATION", request.config.configuration.as_str())
            .env("FORGE_OPTIMIZATION", request.config.optimization.as_str())
            .env("FORGE_TARGET", &request.target)
            .env("FORGE_PLATFORM", request.config.platform.as_str())
            .env("FORGE_CHANGED_FILES", changed))
    }

    /// Uses the configured artifact paths, or everything in the output
    /// directory when none are configured.
    fn collect_artifacts(
        &self,
        request: &BuildRequest,
        _output: &ProcessOutput,
    ) -> Result<Artifacts, ToolchainError> {
        if request.artifacts.is_empty() {
            output_dir_contents(request)
        } else {
            Ok(Artifacts::new(&request.output_dir, request.artifacts.clone()))
        }
    }
}

/// Every top-level entry of the output directory, sorted.
pub(crate) fn output_dir_contents(request: &BuildRequest) -> Result<Artifacts, ToolchainError> {
    let dir = &request.output_dir;
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.map(|e| PathBuf::from(e.file_name())))
            .collect::<Result<_, _>>()
            .map_err(ToolchainError::io(dir))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(ToolchainError::io(dir)(e)),
    };
    paths.sort();
    Ok(Artifacts::new(dir, paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::{BuildConfig, ConfigLevel, Platform};

    fn request(out: &std::path::Path) -> BuildRequest {
        let config = BuildConfig::new(Platform::Linux).with_configuration(ConfigLevel::Release);
        BuildRequest::new("tool", "/proj", vec![], config, out)
    }

    #[test]
    fn expands_placeholders_and_env() {
        let mut req = request(std::path::Path::new("/proj/build/tool"))
            .with_command(["make", "OUT={output}", "MODE={configuration}", "{target}"]);
        req.changed_files = vec![PathBuf::from("src/a.c"), PathBuf::from("src/b.c")];

        let spec = CustomAdapter.command(&req).unwrap();
        assert_eq!(spec.program, "make");
        assert_eq!(spec.args, vec!["OUT=/proj/build/tool", "MODE=release", "tool"]);
        assert_eq!(spec.cwd, PathBuf::from("/proj"));
        assert_eq!(spec.env["FORGE_OUTPUT_DIR"], "/proj/build/tool");
        assert_eq!(spec.env["FORGE_CONFIGURATION"], "release");
        assert_eq!(spec.env["FORGE_OPTIMIZATION"], "standard");
        assert_eq!(spec.env["FORGE_TARGET"], "tool");
        assert_eq!(spec.env["FORGE_PLATFORM"], "linux");
        assert_eq!(spec.env["FORGE_CHANGED_FILES"], "src/a.c\nsrc/b.c");
    }

    #[test]
    fn empty_command_errors() {
        let req = request(std::path::Path::new("/o"));
        assert!(matches!(
            CustomAdapter.command(&req),
            Err(ToolchainError::NoCommand { .. })
        ));
        assert!(CustomAdapter.tools(&req).is_empty());
    }

    #[test]
    fn tools_name_the_program() {
        let req = request(std::path::Path::new("/o")).with_command(["cargo", "build"]);
        let tools = CustomAdapter.tools(&req);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].tool, "cargo");
        assert!(tools[0].version_args.is_empty());
    }

    #[test]
    fn artifacts_default_to_output_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.bin"), "b").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let output = ProcessOutput {
            exit_code: Some(0),
            success: true,
            stdout: vec![],
            stderr: vec![],
            duration: std::time::Duration::ZERO,
        };

        let req = request(dir.path());
        let all = CustomAdapter.collect_artifacts(&req, &output).unwrap();
        assert_eq!(all.paths, vec![PathBuf::from("a"), PathBuf::from("b.bin")]);

        let req = request(dir.path()).with_artifacts(["b.bin"]);
        let some = CustomAdapter.collect_artifacts(&req, &output).unwrap();
        assert_eq!(some.paths, vec![PathBuf::from("b.bin")]);

        let missing = request(&dir.path().join("nope"));
        assert!(CustomAdapter.collect_artifacts(&missing, &output).unwrap().is_empty());
    }
}
