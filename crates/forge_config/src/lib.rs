//! Parsing and validation of `forge.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`ProjectConfig`], then resolves individual targets into the
//! [`ResolvedTarget`] form the scheduler consumes.

#![warn(missing_docs)]

pub mod duration;
pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use duration::parse_duration;
pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{cache_root, resolve_target, ResolvedTarget};
pub use types::*;
