//! Value-typed build configuration shared by the scheduler, cache and adapters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::hash::{ContentHash, ContentHasher};
use crate::platform::Platform;

/// Configuration level passed to the platform toolchain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLevel {
    /// Unoptimized build with debug info (default).
    #[default]
    Debug,
    /// Optimized, distributable build.
    Release,
}

impl ConfigLevel {
    /// Returns the lowercase name used in cache keys and environment variables.
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigLevel::Debug => "debug",
            ConfigLevel::Release => "release",
        }
    }
}

impl fmt::Display for ConfigLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimization level forwarded to toolchains that support one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    /// Fastest turnaround, no extra toolchain caching flags.
    Minimal,
    /// The toolchain's own build cache enabled (default).
    #[default]
    Standard,
    /// Every optimization the toolchain offers.
    Aggressive,
}

impl OptLevel {
    /// Returns the lowercase name used in cache keys and environment variables.
    pub fn as_str(self) -> &'static str {
        match self {
            OptLevel::Minimal => "minimal",
            OptLevel::Standard => "standard",
            OptLevel::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete configuration of one target build.
///
/// Equality is structural: two configs that differ in any field, including a
/// single option value, produce different cache keys. Options live in a
/// `BTreeMap` so their iteration order, and therefore the digest, never
/// depends on insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildConfig {
    /// The platform being built.
    pub platform: Platform,
    /// Debug or release.
    #[serde(default)]
    pub configuration: ConfigLevel,
    /// Optimization level.
    #[serde(default)]
    pub optimization: OptLevel,
    /// Free-form options forwarded to the adapter.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Creates a debug, standard-optimization config with no options.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            configuration: ConfigLevel::default(),
            optimization: OptLevel::default(),
            options: BTreeMap::new(),
        }
    }

    /// Sets the configuration level.
    pub fn with_configuration(mut self, configuration: ConfigLevel) -> Self {
        self.configuration = configuration;
        self
    }

    /// Sets the optimization level.
    pub fn with_optimization(mut self, optimization: OptLevel) -> Self {
        self.optimization = optimization;
        self
    }

    /// Adds or replaces one option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Feeds the canonical form of this config into `hasher`.
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher.field("platform", self.platform.as_str().as_bytes());
        hasher.field("configuration", self.configuration.as_str().as_bytes());
        hasher.field("optimization", self.optimization.as_str().as_bytes());
        for (key, value) in &self.options {
            hasher.field("option.key", key.as_bytes());
            hasher.field("option.value", value.as_bytes());
        }
    }

    /// Returns a digest of this config alone.
    pub fn digest(&self) -> ContentHash {
        let mut hasher = ContentHasher::new();
        self.hash_into(&mut hasher);
        hasher.finish()
    }
}
