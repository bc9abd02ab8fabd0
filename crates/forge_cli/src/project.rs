//! Locating the project and its on-disk state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use forge_cache::{BuildCache, EvictionPolicy};
use forge_config::{CacheSettings, ProjectConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// Per-project state directory, relative to the project root.
pub const STATE_DIR: &str = ".forge";

/// Walks up from `start` looking for a directory that contains `forge.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `forge.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

/// A loaded project: its root, configuration and cache.
pub struct Project {
    /// Directory holding `forge.toml`.
    pub root: PathBuf,
    /// Parsed configuration.
    pub config: ProjectConfig,
}

impl Project {
    /// Finds and loads the project selected by the global args.
    pub fn load(global: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let root = resolve_project_root(global)?;
        let config = forge_config::load_config(&root)?;
        Ok(Self { root, config })
    }

    /// The `.forge` state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Directory for per-step toolchain logs.
    pub fn log_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }

    /// Opens the artifact cache configured in `[cache]`.
    pub fn open_cache(&self) -> Arc<BuildCache> {
        let root = forge_config::cache_root(&self.config, &self.root);
        Arc::new(BuildCache::open(&root, env!("CARGO_PKG_VERSION")))
    }
}

/// The eviction policy configured in `[cache]`, or `None` when unbounded.
pub fn eviction_policy(settings: &CacheSettings) -> Option<EvictionPolicy> {
    if settings.max_size_mb.is_none() && settings.max_age_days.is_none() {
        return None;
    }
    Some(EvictionPolicy {
        max_total_bytes: settings.max_size_mb.map(|mb| mb * 1024 * 1024),
        max_age: settings
            .max_age_days
            .map(|days| std::time::Duration::from_secs(days * 24 * 60 * 60)),
    })
}

/// Formats a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = "[project]\nname = \"demo\"\n";

    #[test]
    fn find_project_root_in_current_dir() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("forge.toml"), CONFIG).unwrap();
        let root = find_project_root(tmp.path()).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn find_project_root_in_parent() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("forge.toml"), CONFIG).unwrap();
        let nested = tmp.path().join("web/src");
        fs::create_dir_all(&nested).unwrap();
        let root = find_project_root(&nested).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn find_project_root_fails_without_config() {
        let tmp = TempDir::new().unwrap();
        let err = find_project_root(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("forge.toml"));
    }

    #[test]
    fn config_flag_accepts_file_or_dir() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("forge.toml");
        fs::write(&file, CONFIG).unwrap();

        let global = |config: &Path| GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(config.to_string_lossy().into_owned()),
        };
        assert_eq!(resolve_project_root(&global(&file)).unwrap(), tmp.path());
        assert_eq!(resolve_project_root(&global(tmp.path())).unwrap(), tmp.path());
    }

    #[test]
    fn project_paths() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("forge.toml"), CONFIG).unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(tmp.path().to_string_lossy().into_owned()),
        };
        let project = Project::load(&global).unwrap();
        assert_eq!(project.state_dir(), tmp.path().join(".forge"));
        assert_eq!(project.log_dir(), tmp.path().join(".forge/logs"));
        assert_eq!(project.open_cache().root(), tmp.path().join(".forge/cache"));
    }

    #[test]
    fn eviction_policy_from_settings() {
        assert!(eviction_policy(&CacheSettings::default()).is_none());
        let settings = CacheSettings {
            max_size_mb: Some(2),
            max_age_days: Some(1),
            ..CacheSettings::default()
        };
        let policy = eviction_policy(&settings).unwrap();
        assert_eq!(policy.max_total_bytes, Some(2 * 1024 * 1024));
        assert_eq!(policy.max_age, Some(std::time::Duration::from_secs(86_400)));
    }

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
