//! Target platform identifiers with alias parsing and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A platform the orchestrator knows how to build for.
///
/// Each platform maps to exactly one toolchain adapter. Parsing accepts the
/// canonical lowercase names as well as the artifact-style shorthands users
/// tend to type (`apk`, `ipa`, `exe`, `app`, `dmg`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android via the Gradle wrapper.
    Android,
    /// iOS via `xcodebuild`.
    Ios,
    /// macOS via `xcodebuild`.
    Macos,
    /// Windows via the .NET SDK.
    Windows,
    /// Linux via a project-supplied command.
    Linux,
    /// Web via npm scripts.
    Web,
}

impl Platform {
    /// Every supported platform, in display order.
    pub const ALL: [Platform; 6] = [
        Platform::Android,
        Platform::Ios,
        Platform::Macos,
        Platform::Windows,
        Platform::Linux,
        Platform::Web,
    ];

    /// Returns the canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing platform names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{input}' (expected one of: android, ios, macos, windows, linux, web)")]
pub struct ParsePlatformError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" | "apk" => Ok(Platform::Android),
            "ios" | "ipa" => Ok(Platform::Ios),
            "macos" | "app" | "dmg" => Ok(Platform::Macos),
            "windows" | "exe" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "web" => Ok(Platform::Web),
            _ => Err(ParsePlatformError {
                input: s.to_string(),
            }),
        }
    }
}
