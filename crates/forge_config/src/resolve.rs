//! Target resolution: merging project-wide and target-specific settings.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use forge_common::{BuildConfig, Platform};
use std::path::{Path, PathBuf};

/// A fully resolved target, ready to hand to the scheduler.
///
/// Paths are absolute (joined onto the project directory) and the
/// [`BuildConfig`] carries the project options with the target's own options
/// overlaid on top.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// The target name.
    pub name: String,
    /// The parsed platform.
    pub platform: Platform,
    /// Source roots.
    pub sources: Vec<PathBuf>,
    /// Directory the toolchain writes into and cache hits restore into.
    pub output_dir: PathBuf,
    /// Custom command line, empty when the platform's built-in invocation applies.
    pub command: Vec<String>,
    /// Artifact paths relative to the output directory.
    pub artifacts: Vec<String>,
    /// Pinned toolchain version, bypassing the probe.
    pub toolchain_version: Option<String>,
    /// Build configuration for this target.
    pub config: BuildConfig,
}

/// Resolves a named target against `project_dir`.
pub fn resolve_target(
    config: &ProjectConfig,
    target_name: &str,
    project_dir: &Path,
) -> Result<ResolvedTarget, ConfigError> {
    let target = config
        .targets
        .get(target_name)
        .ok_or_else(|| ConfigError::UnknownTarget(target_name.to_string()))?;

    let platform: Platform = target
        .platform
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("target '{target_name}': {e}")))?;

    let mut build_config = BuildConfig::new(platform)
        .with_configuration(config.build.configuration)
        .with_optimization(config.build.optimization);
    build_config.options = config.build.options.clone();
    for (key, value) in &target.options {
        build_config.options.insert(key.clone(), value.clone());
    }

    let output = target
        .output
        .clone()
        .unwrap_or_else(|| format!("build/{target_name}"));

    let command = match target.command.as_slice() {
        [single] => single.split_whitespace().map(str::to_string).collect(),
        many => many.to_vec(),
    };

    Ok(ResolvedTarget {
        name: target_name.to_string(),
        platform,
        sources: target.sources.iter().map(|s| project_dir.join(s)).collect(),
        output_dir: project_dir.join(output),
        command,
        artifacts: target.artifacts.clone(),
        toolchain_version: target.toolchain_version.clone(),
        config: build_config,
    })
}

/// Returns the absolute cache root for a project.
pub fn cache_root(config: &ProjectConfig, project_dir: &Path) -> PathBuf {
    project_dir.join(&config.cache.dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;
    use forge_common::{ConfigLevel, OptLevel};

    fn sample() -> ProjectConfig {
        load_config_from_str(
            r#"
[project]
name = "demo"

[build]
configuration = "release"
optimization = "minimal"

[build.options]
minify = "false"
locale = "en"

[targets.web]
platform = "web"
sources = ["src", "assets"]

[targets.web.options]
minify = "true"

[targets.android]
platform = "apk"
output = "out/android"

[targets.tool]
platform = "linux"
command = "make  dist"
"#,
        )
        .unwrap()
    }

    #[test]
    fn resolve_overlays_options() {
        let config = sample();
        let web = resolve_target(&config, "web", Path::new("/proj")).unwrap();
        assert_eq!(web.platform, Platform::Web);
        assert_eq!(web.config.configuration, ConfigLevel::Release);
        assert_eq!(web.config.optimization, OptLevel::Minimal);
        assert_eq!(web.config.options["minify"], "true");
        assert_eq!(web.config.options["locale"], "en");
    }

    #[test]
    fn resolve_paths_are_absolute() {
        let config = sample();
        let web = resolve_target(&config, "web", Path::new("/proj")).unwrap();
        assert_eq!(
            web.sources,
            vec![PathBuf::from("/proj/src"), PathBuf::from("/proj/assets")]
        );
        assert_eq!(web.output_dir, PathBuf::from("/proj/build/web"));

        let android = resolve_target(&config, "android", Path::new("/proj")).unwrap();
        assert_eq!(android.platform, Platform::Android);
        assert_eq!(android.output_dir, PathBuf::from("/proj/out/android"));
    }

    #[test]
    fn resolve_splits_command_string() {
        let config = sample();
        let tool = resolve_target(&config, "tool", Path::new("/proj")).unwrap();
        assert_eq!(tool.command, vec!["make", "dist"]);
    }

    #[test]
    fn resolve_unknown_target() {
        let config = sample();
        let err = resolve_target(&config, "nope", Path::new("/proj")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget(ref n) if n == "nope"));
    }

    #[test]
    fn cache_root_defaults_under_project() {
        let config = sample();
        assert_eq!(
            cache_root(&config, Path::new("/proj")),
            PathBuf::from("/proj/.forge/cache")
        );
    }
}
