//! Adapter inputs and outputs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use forge_common::BuildConfig;

use crate::error::ToolchainError;

/// Everything an adapter may look at when building one target.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Target name from `forge.toml`.
    pub target: String,
    /// Directory containing `forge.toml`.
    pub project_dir: PathBuf,
    /// Absolute source roots.
    pub sources: Vec<PathBuf>,
    /// Effective configuration.
    pub config: BuildConfig,
    /// Directory that receives the target's artifacts.
    pub output_dir: PathBuf,
    /// Files changed since the last successful build, relative to
    /// `project_dir`. Empty on a full build.
    pub changed_files: Vec<PathBuf>,
    /// Explicit command line; selects the custom adapter when non-empty.
    pub command: Vec<String>,
    /// Artifact paths relative to `output_dir` for the custom adapter.
    pub artifacts: Vec<PathBuf>,
    /// Pinned toolchain version string.
    pub toolchain_version: Option<String>,
}

impl BuildRequest {
    /// Creates a request with no command, artifacts or changed files.
    pub fn new(
        target: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        sources: Vec<PathBuf>,
        config: BuildConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            target: target.into(),
            project_dir: project_dir.into(),
            sources,
            config,
            output_dir: output_dir.into(),
            changed_files: Vec::new(),
            command: Vec::new(),
            artifacts: Vec::new(),
            toolchain_version: None,
        }
    }

    /// Sets the custom command line.
    pub fn with_command<S: Into<String>>(mut self, command: impl IntoIterator<Item = S>) -> Self {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the artifact paths collected from the output directory.
    pub fn with_artifacts<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.artifacts = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Returns a config option value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.config.options.get(key).map(String::as_str)
    }

    /// Returns the platform project directory: the `project_dir` option
    /// resolved against the project root, or the project root itself.
    pub fn platform_dir(&self) -> PathBuf {
        match self.option("project_dir") {
            Some(dir) => self.project_dir.join(dir),
            None => self.project_dir.clone(),
        }
    }

    /// Empties `output_dir` so a build or cache restore starts from nothing.
    ///
    /// Refuses when the output directory is the project directory, a source
    /// root, or one of their ancestors.
    pub fn reset_output_dir(&self) -> Result<(), ToolchainError> {
        let dir = &self.output_dir;
        let mut guarded = std::iter::once(&self.project_dir).chain(self.sources.iter());
        if let Some(inside) = guarded.find(|p| p.starts_with(dir)) {
            return Err(ToolchainError::UnsafeOutputDir {
                dir: dir.clone(),
                contains: inside.clone(),
            });
        }
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ToolchainError::Io { path: dir.clone(), source: e }),
        }
        std::fs::create_dir_all(dir).map_err(ToolchainError::io(dir))
    }
}

/// A fully resolved child-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Creates a command run from `cwd` with no arguments.
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns program and arguments as one list.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Artifacts produced by a toolchain run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    /// Directory the paths are relative to.
    pub root: PathBuf,
    /// Files or directories relative to `root`.
    pub paths: Vec<PathBuf>,
}

impl Artifacts {
    /// Creates an artifact set.
    pub fn new(root: impl Into<PathBuf>, paths: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            paths,
        }
    }

    /// Returns `true` if nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Copies the artifacts into `output_dir` (unless they already live
    /// there) and returns their paths relative to it.
    pub fn stage_into(&self, output_dir: &Path) -> Result<Vec<PathBuf>, ToolchainError> {
        if self.root == output_dir {
            return Ok(self.paths.clone());
        }
        let mut staged = Vec::with_capacity(self.paths.len());
        for rel in &self.paths {
            let name = rel.file_name().map(PathBuf::from).unwrap_or_else(|| rel.clone());
            copy_recursive(&self.root.join(rel), &output_dir.join(&name))?;
            staged.push(name);
        }
        staged.sort();
        staged.dedup();
        Ok(staged)
    }
}

fn copy_recursive(from: &Path, to: &Path) -> Result<(), ToolchainError> {
    if from.is_dir() {
        std::fs::create_dir_all(to).map_err(ToolchainError::io(to))?;
        for entry in std::fs::read_dir(from).map_err(ToolchainError::io(from))? {
            let entry = entry.map_err(ToolchainError::io(from))?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(ToolchainError::io(parent))?;
        }
        std::fs::copy(from, to).map_err(ToolchainError::io(from))?;
        Ok(())
    }
}

/// Recursively finds entries under `dir` accepted by `matches`, relative to
/// `dir`, sorted. A matching directory is returned whole and not descended
/// into. A missing `dir` yields nothing.
pub(crate) fn find_entries(
    dir: &Path,
    matches: &dyn Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, ToolchainError> {
    fn walk(
        root: &Path,
        dir: &Path,
        matches: &dyn Fn(&Path) -> bool,
        out: &mut Vec<PathBuf>,
    ) -> Result<(), ToolchainError> {
        for entry in std::fs::read_dir(dir).map_err(ToolchainError::io(dir))? {
            let path = entry.map_err(ToolchainError::io(dir))?.path();
            if matches(&path) {
                if let Ok(rel) = path.strip_prefix(root) {
                    out.push(rel.to_path_buf());
                }
            } else if path.is_dir() {
                walk(root, &path, matches, out)?;
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    if dir.is_dir() {
        walk(dir, dir, matches, &mut out)?;
    }
    out.sort();
    Ok(out)
}

/// Returns the first entry in `dir` (sorted by name) with extension `ext`.
pub(crate) fn first_with_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == ext))
        .collect();
    found.sort();
    found.into_iter().next()
}
