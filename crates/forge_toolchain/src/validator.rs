//! Pre-build dependency validation.
//!
//! Every adapter declares the external tools it needs. The validator probes
//! each one by running its version command with a short timeout and compares
//! the first dotted number in the output against the declared minimum.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use forge_common::Platform;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout for one version probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A tool an adapter depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
    /// Executable name.
    pub tool: String,
    /// Arguments that make the tool print its version. Empty means only
    /// check that the executable exists on `PATH`.
    pub version_args: Vec<String>,
    /// Whether a missing tool blocks the build.
    pub required: bool,
    /// Minimum acceptable version.
    pub min_version: Option<String>,
    /// How to install the tool.
    pub install_instructions: String,
    /// What the tool provides; named in warnings when an optional tool is missing.
    pub capability: String,
}

impl ToolRequirement {
    /// A required tool probed with `version_args`.
    pub fn required(tool: &str, version_args: &[&str], install: &str, capability: &str) -> Self {
        Self {
            tool: tool.to_string(),
            version_args: version_args.iter().map(|s| s.to_string()).collect(),
            required: true,
            min_version: None,
            install_instructions: install.to_string(),
            capability: capability.to_string(),
        }
    }

    /// An optional tool probed with `version_args`.
    pub fn optional(tool: &str, version_args: &[&str], install: &str, capability: &str) -> Self {
        Self {
            required: false,
            ..Self::required(tool, version_args, install, capability)
        }
    }

    /// Sets the minimum version.
    pub fn min_version(mut self, version: &str) -> Self {
        self.min_version = Some(version.to_string());
        self
    }
}

/// Probe result for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    /// Executable name.
    pub tool: String,
    /// Whether a missing tool blocks the build.
    pub required: bool,
    /// Minimum acceptable version.
    pub min_version: Option<String>,
    /// Version parsed from the probe output.
    pub found_version: Option<String>,
    /// Installed and new enough.
    pub satisfied: bool,
    /// How to install the tool.
    pub install_instructions: String,
    /// Capability the tool provides.
    pub capability: String,
}

/// Result of validating one target's tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Target name, or the platform name for `forge doctor`.
    pub target: String,
    /// Platform checked.
    pub platform: Platform,
    /// One status per declared tool, in declaration order.
    pub statuses: Vec<ToolStatus>,
}

impl ValidationReport {
    /// Returns `true` if no required tool is missing or too old.
    pub fn is_satisfied(&self) -> bool {
        self.statuses.iter().all(|s| s.satisfied || !s.required)
    }

    /// Required tools that are missing or too old.
    pub fn unmet(&self) -> impl Iterator<Item = &ToolStatus> {
        self.statuses.iter().filter(|s| s.required && !s.satisfied)
    }

    /// Optional tools that are missing.
    pub fn degraded(&self) -> impl Iterator<Item = &ToolStatus> {
        self.statuses.iter().filter(|s| !s.required && !s.satisfied)
    }

    /// Identifies the installed toolchain, e.g. `node=18.12.0;npm=9.2.0`.
    ///
    /// Tools without a parsed version contribute `tool=?` so that a tool
    /// appearing or disappearing still changes the string.
    pub fn toolchain_version(&self) -> String {
        let mut parts: Vec<String> = self
            .statuses
            .iter()
            .filter(|s| s.satisfied)
            .map(|s| format!("{}={}", s.tool, s.found_version.as_deref().unwrap_or("?")))
            .collect();
        parts.sort();
        parts.join(";")
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", self.target, self.platform)?;
        for status in &self.statuses {
            let mark = if status.satisfied { "ok" } else { "missing" };
            let kind = if status.required { "required" } else { "optional" };
            write!(f, "  [{mark}] {} ({kind}", status.tool)?;
            if let Some(min) = &status.min_version {
                write!(f, ", >= {min}")?;
            }
            write!(f, ")")?;
            if let Some(found) = &status.found_version {
                write!(f, " found {found}")?;
            }
            writeln!(f)?;
            if !status.satisfied {
                writeln!(f, "        install: {}", status.install_instructions)?;
            }
        }
        Ok(())
    }
}

/// Probes external tools.
#[derive(Debug, Clone)]
pub struct DependencyValidator {
    probe_timeout: Duration,
}

impl Default for DependencyValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyValidator {
    /// Creates a validator with the default probe timeout.
    pub fn new() -> Self {
        Self {
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Returns the built-in tool table for a platform.
    ///
    /// `linux` builds run an arbitrary configured command, so its table is
    /// empty; the custom adapter supplies the command's program instead.
    pub fn platform_tools(platform: Platform) -> Vec<ToolRequirement> {
        match platform {
            Platform::Android => vec![
                ToolRequirement::required(
                    "adb",
                    &["--version"],
                    "Install Android Studio from https://developer.android.com/studio",
                    "device deployment",
                ),
                ToolRequirement::required(
                    "gradle",
                    &["--version"],
                    "Installed with Android Studio or from https://gradle.org",
                    "android build",
                ),
                ToolRequirement::required(
                    "java",
                    &["-version"],
                    "Install a JDK from https://adoptium.net/",
                    "android build",
                )
                .min_version("11"),
            ],
            Platform::Ios => vec![
                ToolRequirement::required(
                    "xcodebuild",
                    &["-version"],
                    "Install Xcode from the Mac App Store (macOS only)",
                    "ios build",
                ),
                ToolRequirement::required(
                    "xcode-select",
                    &["-p"],
                    "xcode-select --install",
                    "command line tools",
                ),
                ToolRequirement::optional(
                    "pod",
                    &["--version"],
                    "sudo gem install cocoapods",
                    "CocoaPods dependencies",
                ),
            ],
            Platform::Macos => vec![ToolRequirement::required(
                "xcodebuild",
                &["-version"],
                "Install Xcode from the Mac App Store (macOS only)",
                "macos build",
            )],
            Platform::Windows => vec![
                ToolRequirement::required(
                    "dotnet",
                    &["--version"],
                    "Install the .NET SDK from https://dotnet.microsoft.com/download",
                    "windows build",
                )
                .min_version("7.0"),
                ToolRequirement::optional(
                    "msbuild",
                    &["-version"],
                    "Install Visual Studio from https://visualstudio.microsoft.com/",
                    "Visual Studio project builds",
                ),
            ],
            Platform::Web => vec![
                ToolRequirement::required(
                    "node",
                    &["--version"],
                    "Install Node.js from https://nodejs.org/",
                    "web build",
                )
                .min_version("16"),
                ToolRequirement::required("npm", &["--version"], "Included with Node.js", "web build"),
            ],
            Platform::Linux => Vec::new(),
        }
    }

    /// Probes every tool and returns the full report.
    ///
    /// Probes run concurrently. Missing optional tools are logged as warnings.
    pub async fn check(
        &self,
        target: &str,
        platform: Platform,
        tools: &[ToolRequirement],
    ) -> ValidationReport {
        let mut set = tokio::task::JoinSet::new();
        for (i, tool) in tools.iter().cloned().enumerate() {
            let timeout = self.probe_timeout;
            set.spawn(async move { (i, probe(&tool, timeout).await) });
        }

        let mut statuses: Vec<Option<ToolStatus>> = vec![None; tools.len()];
        while let Some(joined) = set.join_next().await {
            if let Ok((i, status)) = joined {
                statuses[i] = Some(status);
            }
        }
        let statuses: Vec<ToolStatus> = statuses
            .into_iter()
            .zip(tools)
            .map(|(status, tool)| status.unwrap_or_else(|| unsatisfied(tool, None)))
            .collect();

        for status in statuses.iter().filter(|s| !s.required && !s.satisfied) {
            warn!(
                target_name = target,
                tool = %status.tool,
                capability = %status.capability,
                "optional tool missing, capability unavailable"
            );
        }

        ValidationReport {
            target: target.to_string(),
            platform,
            statuses,
        }
    }

    /// Checks the built-in tool table of `platform`.
    pub async fn check_platform(&self, platform: Platform) -> ValidationReport {
        let tools = Self::platform_tools(platform);
        self.check(platform.as_str(), platform, &tools).await
    }
}

async fn probe(tool: &ToolRequirement, timeout: Duration) -> ToolStatus {
    if tool.version_args.is_empty() {
        let found = find_executable(&tool.tool).is_some();
        debug!(tool = %tool.tool, found, "checked executable");
        return ToolStatus {
            satisfied: found && tool.min_version.is_none(),
            ..unsatisfied(tool, None)
        };
    }

    let child = Command::new(&tool.tool)
        .args(&tool.version_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(tool = %tool.tool, error = %e, "probe failed to start");
            return unsatisfied(tool, None);
        }
        Err(_) => {
            debug!(tool = %tool.tool, "probe timed out");
            return unsatisfied(tool, None);
        }
    };

    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let found_version = parse_version(&text);
    let new_enough = match (&tool.min_version, &found_version) {
        (None, _) => true,
        (Some(min), Some(found)) => compare_versions(found, min) != Ordering::Less,
        (Some(_), None) => false,
    };
    debug!(tool = %tool.tool, version = ?found_version, status = %output.status, "probed tool");

    ToolStatus {
        satisfied: output.status.success() && new_enough,
        ..unsatisfied(tool, found_version)
    }
}

fn unsatisfied(tool: &ToolRequirement, found_version: Option<String>) -> ToolStatus {
    ToolStatus {
        tool: tool.tool.clone(),
        required: tool.required,
        min_version: tool.min_version.clone(),
        found_version,
        satisfied: false,
        install_instructions: tool.install_instructions.clone(),
        capability: tool.capability.clone(),
    }
}

/// Returns the first dotted number in `text` (`"v18.12.0"` gives `18.12.0`),
/// falling back to the first plain number.
pub fn parse_version(text: &str) -> Option<String> {
    let mut first_plain = None;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        let candidate = text[start..i].trim_end_matches('.');
        if candidate.contains('.') {
            return Some(candidate.to_string());
        }
        first_plain.get_or_insert_with(|| candidate.to_string());
    }
    first_plain
}

/// Compares dotted versions numerically; missing components count as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.').map(|part| part.parse().unwrap_or(0)).collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Locates `program` on `PATH`, or checks it directly if it contains a path
/// separator.
pub(crate) fn find_executable(program: &str) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| {
            let plain = dir.join(program);
            let exe = dir.join(format!("{program}.exe"));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}
