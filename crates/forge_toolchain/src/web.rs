//! npm script builds for web targets.

use std::path::{Path, PathBuf};

use forge_common::{ConfigLevel, OptLevel, Platform};
use serde::Deserialize;
use tracing::debug;

use crate::adapter::ToolchainAdapter;
use crate::error::ToolchainError;
use crate::request::{Artifacts, BuildRequest, CommandSpec};
use crate::runner::ProcessOutput;
use crate::validator::{DependencyValidator, ToolRequirement};

/// Directories searched, in order, for the bundler's output.
pub const OUTPUT_DIRS: [&str; 4] = ["dist", "build", "out", "public"];

/// Runs `npm run build` (or `build:dev` for debug builds when defined).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebAdapter;

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: std::collections::BTreeMap<String, String>,
}

fn read_package(dir: &Path) -> Result<PackageJson, ToolchainError> {
    let path = dir.join("package.json");
    let text = std::fs::read_to_string(&path).map_err(|_| ToolchainError::InvalidProject {
        platform: "web",
        dir: dir.to_path_buf(),
        reason: "no package.json found".into(),
    })?;
    serde_json::from_str(&text).map_err(|e| ToolchainError::InvalidProject {
        platform: "web",
        dir: dir.to_path_buf(),
        reason: format!("invalid package.json: {e}"),
    })
}

impl ToolchainAdapter for WebAdapter {
    fn name(&self) -> &'static str {
        "web"
    }

    fn tools(&self, _request: &BuildRequest) -> Vec<ToolRequirement> {
        DependencyValidator::platform_tools(Platform::Web)
    }

    fn command(&self, request: &BuildRequest) -> Result<CommandSpec, ToolchainError> {
        let dir = request.platform_dir();
        let package = read_package(&dir)?;

        let preferred = match request.config.configuration {
            ConfigLevel::Debug => "build:dev",
            ConfigLevel::Release => "build",
        };
        let script = if package.scripts.contains_key(preferred) {
            preferred
        } else if package.scripts.contains_key("build") {
            "build"
        } else {
            return Err(ToolchainError::InvalidProject {
                platform: "web",
                dir,
                reason: "package.json has no build script".into(),
            });
        };

        let mut spec = CommandSpec::new("npm", &dir).args(["run", script]);
        if request.config.optimization == OptLevel::Aggressive {
            spec = spec.env("NODE_ENV", "production");
        }
        Ok(spec)
    }

    /// Picks the first non-empty output directory. Directories that contain
    /// the target's own output directory are skipped.
    fn collect_artifacts(
        &self,
        request: &BuildRequest,
        _output: &ProcessOutput,
    ) -> Result<Artifacts, ToolchainError> {
        let dir = request.platform_dir();
        let found = OUTPUT_DIRS
            .iter()
            .map(|name| dir.join(name))
            .filter(|candidate| !request.output_dir.starts_with(candidate))
            .find(|candidate| is_non_empty_dir(candidate));

        match found {
            Some(out) => {
                debug!(target_name = %request.target, dir = %out.display(), "found web bundle");
                let rel = out.strip_prefix(&dir).map(Path::to_path_buf).unwrap_or(out);
                Ok(Artifacts::new(dir, vec![rel]))
            }
            None => Ok(Artifacts::new(dir, Vec::<PathBuf>::new())),
        }
    }
}

fn is_non_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::BuildConfig;

    fn project(scripts: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            format!(r#"{{"name":"site","scripts":{{{scripts}}}}}"#),
        )
        .unwrap();
        dir
    }

    fn output() -> ProcessOutput {
        ProcessOutput {
            exit_code: Some(0),
            success: true,
            stdout: vec![],
            stderr: vec![],
            duration: std::time::Duration::ZERO,
        }
    }

    #[test]
    fn debug_prefers_build_dev() {
        let dir = project(r#""build":"webpack","build:dev":"webpack --mode development""#);
        let req = BuildRequest::new("site", dir.path(), vec![], BuildConfig::new(Platform::Web), dir.path().join("o"));
        let spec = WebAdapter.command(&req).unwrap();
        assert_eq!(spec.argv(), vec!["npm", "run", "build:dev"]);
        assert!(spec.env.is_empty());
    }

    #[test]
    fn falls_back_to_build_and_sets_production() {
        let dir = project(r#""build":"vite build""#);
        let config = BuildConfig::new(Platform::Web).with_optimization(OptLevel::Aggressive);
        let req = BuildRequest::new("site", dir.path(), vec![], config, dir.path().join("o"));
        let spec = WebAdapter.command(&req).unwrap();
        assert_eq!(spec.argv(), vec!["npm", "run", "build"]);
        assert_eq!(spec.env["NODE_ENV"], "production");
    }

    #[test]
    fn missing_build_script_is_invalid() {
        let dir = project(r#""test":"jest""#);
        let req = BuildRequest::new("site", dir.path(), vec![], BuildConfig::new(Platform::Web), dir.path().join("o"));
        assert!(WebAdapter.command(&req).is_err());
    }

    #[test]
    fn first_non_empty_output_dir_wins() {
        let dir = project(r#""build":"x""#);
        std::fs::create_dir(dir.path().join("dist")).unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        std::fs::write(dir.path().join("out/index.html"), "<html>").unwrap();

        let out_dir = dir.path().join("build/site");
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("stale"), "x").unwrap();

        let req = BuildRequest::new("site", dir.path(), vec![], BuildConfig::new(Platform::Web), &out_dir);
        let artifacts = WebAdapter.collect_artifacts(&req, &output()).unwrap();
        assert_eq!(artifacts.paths, vec![PathBuf::from("out")]);
    }
}
