//! Shared foundational types used across the Forge build orchestrator.
//!
//! This crate provides content hashing, the platform identifiers understood by
//! the toolchain adapters, and the value-typed [`BuildConfig`] that feeds every
//! cache key.

#![warn(missing_docs)]

pub mod config;
pub mod hash;
pub mod platform;

pub use config::{BuildConfig, ConfigLevel, OptLevel};
pub use hash::{ContentHash, ContentHasher, ParseHashError};
pub use platform::{ParsePlatformError, Platform};
