//! Turning `forge.toml` targets into build requests.

use std::path::{Path, PathBuf};

use forge_common::{ConfigLevel, OptLevel};
use forge_config::{resolve_target, ConfigError, ProjectConfig};
use forge_toolchain::BuildRequest;

/// Command-line overrides applied on top of the file configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `[build] configuration`.
    pub configuration: Option<ConfigLevel>,
    /// Replaces `[build] optimization`.
    pub optimization: Option<OptLevel>,
}

/// Resolves the named targets (all targets when `names` is empty) into
/// requests, in the order given or in name order.
pub fn plan_requests(
    config: &ProjectConfig,
    project_dir: &Path,
    names: &[String],
    overrides: &ConfigOverrides,
) -> Result<Vec<BuildRequest>, ConfigError> {
    let names: Vec<&str> = if names.is_empty() {
        config.targets.keys().map(String::as_str).collect()
    } else {
        names.iter().map(String::as_str).collect()
    };
    if names.is_empty() {
        return Err(ConfigError::ValidationError("no targets defined in forge.toml".into()));
    }

    names
        .into_iter()
        .map(|name| {
            let resolved = resolve_target(config, name, project_dir)?;
            let mut build_config = resolved.config;
            if let Some(level) = overrides.configuration {
                build_config.configuration = level;
            }
            if let Some(level) = overrides.optimization {
                build_config.optimization = level;
            }

            let mut request = BuildRequest::new(
                resolved.name,
                project_dir,
                resolved.sources,
                build_config,
                resolved.output_dir,
            )
            .with_command(resolved.command)
            .with_artifacts(resolved.artifacts.into_iter().map(PathBuf::from));
            request.toolchain_version = resolved.toolchain_version;
            Ok(request)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::Platform;
    use forge_config::load_config_from_str;

    const CONFIG: &str = r#"
[project]
name = "demo"

[build]
configuration = "debug"

[build.options]
minify = true

[targets.site]
platform = "web"
sources = ["web"]
options = { minify = false }

[targets.tool]
platform = "linux"
command = "make {target}"
artifacts = ["tool.bin"]
toolchain_version = "make-4.3"
"#;

    #[test]
    fn plans_all_targets_in_name_order() {
        let config = load_config_from_str(CONFIG).unwrap();
        let requests =
            plan_requests(&config, Path::new("/p"), &[], &ConfigOverrides::default()).unwrap();
        let names: Vec<_> = requests.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(names, ["site", "tool"]);

        let site = &requests[0];
        assert_eq!(site.config.platform, Platform::Web);
        assert_eq!(site.sources, vec![PathBuf::from("/p/web")]);
        assert_eq!(site.output_dir, PathBuf::from("/p/build/site"));
        assert_eq!(site.option("minify"), Some("false"));

        let tool = &requests[1];
        assert_eq!(tool.command, vec!["make", "{target}"]);
        assert_eq!(tool.artifacts, vec![PathBuf::from("tool.bin")]);
        assert_eq!(tool.toolchain_version.as_deref(), Some("make-4.3"));
    }

    #[test]
    fn overrides_apply() {
        let config = load_config_from_str(CONFIG).unwrap();
        let overrides = ConfigOverrides {
            configuration: Some(ConfigLevel::Release),
            optimization: Some(OptLevel::Aggressive),
        };
        let requests =
            plan_requests(&config, Path::new("/p"), &["site".to_string()], &overrides).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].config.configuration, ConfigLevel::Release);
        assert_eq!(requests[0].config.optimization, OptLevel::Aggressive);
    }

    #[test]
    fn unknown_target_errors() {
        let config = load_config_from_str(CONFIG).unwrap();
        let err = plan_requests(
            &config,
            Path::new("/p"),
            &["nope".to_string()],
            &ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget(_)));
    }
}
