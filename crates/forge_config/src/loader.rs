//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use forge_common::Platform;
use std::path::Path;

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "forge.toml";

/// Loads and validates a `forge.toml` configuration from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `forge.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks required fields and cross-field consistency.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.build.jobs == Some(0) {
        return Err(ConfigError::ValidationError(
            "build.jobs must be at least 1".to_string(),
        ));
    }

    for (name, target) in &config.targets {
        let platform: Platform = target
            .platform
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("target '{name}': {e}")))?;
        if target.sources.is_empty() || target.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "target '{name}': sources must list at least one non-empty directory"
            )));
        }
        if platform == Platform::Linux && target.command.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "targets.{name}.command"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[project]
name = "hello"
version = "0.1.0"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.project.name, "hello");
        assert_eq!(config.project.version, "0.1.0");
        assert!(config.targets.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[project]
name = "hello"
version = "0.1.0"

[build]
configuration = "release"
jobs = 2
timeout = "5m"

[build.options]
minify = true

[cache]
max_size_mb = 100

[targets.android]
platform = "apk"
sources = ["src", "android"]

[targets.web]
platform = "web"
output = "public"

[targets.cli]
platform = "linux"
command = "make all"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.targets.len(), 3);
        assert_eq!(config.targets["android"].sources, vec!["src", "android"]);
        assert_eq!(config.targets["web"].output.as_deref(), Some("public"));
        assert_eq!(config.cache.max_size_mb, Some(100));
    }

    #[test]
    fn missing_name_errors() {
        let toml = r#"
[project]
name = ""
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn zero_jobs_rejected() {
        let toml = r#"
[project]
name = "x"

[build]
jobs = 0
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn unknown_platform_rejected() {
        let toml = r#"
[project]
name = "x"

[targets.console]
platform = "gamecube"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("gamecube"));
    }

    #[test]
    fn linux_requires_command() {
        let toml = r#"
[project]
name = "x"

[targets.cli]
platform = "linux"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "targets.cli.command"));
    }

    #[test]
    fn empty_sources_rejected() {
        let toml = r#"
[project]
name = "x"

[targets.web]
platform = "web"
sources = []
"#;
        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[project]\nname = \"ondisk\"\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.project.name, "ondisk");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
