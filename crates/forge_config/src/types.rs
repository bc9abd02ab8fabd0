//! Configuration types deserialized from `forge.toml`.

use std::collections::BTreeMap;
use std::time::Duration;

use forge_common::{ConfigLevel, OptLevel};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

use crate::duration::deserialize_duration;

/// Default child-process timeout for one toolchain invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default cache directory, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".forge/cache";

/// The top-level project configuration parsed from `forge.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Project-wide build settings.
    #[serde(default)]
    pub build: BuildSettings,
    /// Artifact cache location and eviction policy.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Named targets, one per platform build.
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

/// Core project metadata required in every `forge.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    #[serde(default)]
    pub version: String,
}

/// Build settings shared by every target.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    /// Debug or release.
    #[serde(default)]
    pub configuration: ConfigLevel,
    /// Optimization level forwarded to toolchains.
    #[serde(default)]
    pub optimization: OptLevel,
    /// Maximum number of targets built at once. Defaults to the CPU count.
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Timeout for one toolchain invocation (`"90s"`, `"10m"`, `"1h"`).
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Scope rebuild decisions to files changed since the last success.
    #[serde(default = "default_true")]
    pub incremental: bool,
    /// Consult and populate the artifact cache.
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Extra attempts after a failed toolchain invocation.
    #[serde(default)]
    pub retries: u32,
    /// Options passed to every target's adapter.
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: BTreeMap<String, String>,
}

impl BuildSettings {
    /// Returns the configured job count, or the machine's parallelism.
    pub fn effective_jobs(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            configuration: ConfigLevel::default(),
            optimization: OptLevel::default(),
            jobs: None,
            timeout: DEFAULT_TIMEOUT,
            incremental: true,
            cache: true,
            retries: 0,
            options: BTreeMap::new(),
        }
    }
}

/// Cache location and eviction policy.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Cache root, relative to the project directory unless absolute.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Evict least-recently-hit entries beyond this total size.
    #[serde(default)]
    pub max_size_mb: Option<u64>,
    /// Evict entries not hit for this many days.
    #[serde(default)]
    pub max_age_days: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size_mb: None,
            max_age_days: None,
        }
    }
}

/// Configuration for one buildable target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Platform name or alias (`android`, `apk`, `web`, ...).
    pub platform: String,
    /// Source roots, relative to the project directory.
    #[serde(default = "default_sources", deserialize_with = "deserialize_string_or_vec")]
    pub sources: Vec<String>,
    /// Output directory. Defaults to `build/<target>`.
    #[serde(default)]
    pub output: Option<String>,
    /// Command line for the custom adapter.
    ///
    /// Accepts a list (used as argv) or a single string (split on whitespace).
    /// Required for `linux`; overrides the built-in invocation elsewhere.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub command: Vec<String>,
    /// Artifact paths relative to the output directory. Empty means everything.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub artifacts: Vec<String>,
    /// Pinned toolchain version string, used instead of probing.
    #[serde(default)]
    pub toolchain_version: Option<String>,
    /// Target-specific options, overlaid on `[build.options]`.
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_sources() -> Vec<String> {
    vec!["src".to_string()]
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

/// Deserializes an options table, stringifying scalar values.
///
/// `minify = true` and `level = 3` become `"true"` and `"3"`; nested tables
/// and arrays are rejected.
fn deserialize_options<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, toml::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => {
                    return Err(de::Error::custom(format!(
                        "option '{key}' must be a string, number or boolean"
                    )))
                }
            };
            Ok((key, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    const HEADER: &str = r#"
[project]
name = "app"
version = "1.0.0"
"#;

    #[test]
    fn build_settings_defaults() {
        let config = load_config_from_str(HEADER).unwrap();
        assert_eq!(config.build.configuration, ConfigLevel::Debug);
        assert_eq!(config.build.optimization, OptLevel::Standard);
        assert_eq!(config.build.timeout, DEFAULT_TIMEOUT);
        assert!(config.build.incremental);
        assert!(config.build.cache);
        assert_eq!(config.build.retries, 0);
        assert!(config.build.jobs.is_none());
        assert!(config.build.effective_jobs() >= 1);
        assert_eq!(config.cache.dir, DEFAULT_CACHE_DIR);
    }

    #[test]
    fn build_settings_explicit() {
        let toml = format!(
            r#"{HEADER}
[build]
configuration = "release"
optimization = "aggressive"
jobs = 3
timeout = "90s"
incremental = false
cache = false
retries = 2
"#
        );
        let config = load_config_from_str(&toml).unwrap();
        assert_eq!(config.build.configuration, ConfigLevel::Release);
        assert_eq!(config.build.optimization, OptLevel::Aggressive);
        assert_eq!(config.build.effective_jobs(), 3);
        assert_eq!(config.build.timeout, Duration::from_secs(90));
        assert!(!config.build.incremental);
        assert!(!config.build.cache);
        assert_eq!(config.build.retries, 2);
    }

    #[test]
    fn options_scalars_are_stringified() {
        let toml = format!(
            r#"{HEADER}
[build.options]
minify = true
level = 3
name = "x"
"#
        );
        let config = load_config_from_str(&toml).unwrap();
        assert_eq!(config.build.options["minify"], "true");
        assert_eq!(config.build.options["level"], "3");
        assert_eq!(config.build.options["name"], "x");
    }

    #[test]
    fn options_reject_tables() {
        let toml = format!(
            r#"{HEADER}
[build.options.nested]
a = 1
"#
        );
        assert!(load_config_from_str(&toml).is_err());
    }

    #[test]
    fn target_defaults() {
        let toml = format!(
            r#"{HEADER}
[targets.site]
platform = "web"
"#
        );
        let config = load_config_from_str(&toml).unwrap();
        let site = &config.targets["site"];
        assert_eq!(site.sources, vec!["src"]);
        assert!(site.output.is_none());
        assert!(site.command.is_empty());
        assert!(site.artifacts.is_empty());
    }

    #[test]
    fn target_string_or_list_fields() {
        let toml = format!(
            r#"{HEADER}
[targets.tool]
platform = "linux"
sources = "lib"
command = ["sh", "-c", "make"]
artifacts = "tool.bin"
"#
        );
        let config = load_config_from_str(&toml).unwrap();
        let tool = &config.targets["tool"];
        assert_eq!(tool.sources, vec!["lib"]);
        assert_eq!(tool.command, vec!["sh", "-c", "make"]);
        assert_eq!(tool.artifacts, vec!["tool.bin"]);
    }

    #[test]
    fn cache_settings() {
        let toml = format!(
            r#"{HEADER}
[cache]
dir = "/tmp/forge-cache"
max_size_mb = 512
max_age_days = 14
"#
        );
        let config = load_config_from_str(&toml).unwrap();
        assert_eq!(config.cache.dir, "/tmp/forge-cache");
        assert_eq!(config.cache.max_size_mb, Some(512));
        assert_eq!(config.cache.max_age_days, Some(14));
    }

    #[test]
    fn bad_timeout_is_parse_error() {
        let toml = format!(
            r#"{HEADER}
[build]
timeout = "forever"
"#
        );
        assert!(load_config_from_str(&toml).is_err());
    }
}
