//! Platform toolchain adapters, the child-process runner and the dependency
//! validator.
//!
//! An adapter translates a [`BuildRequest`] into a [`CommandSpec`] and, after a
//! successful run, locates the artifacts the toolchain produced. The
//! [`ProcessRunner`] executes the command with a timeout and cancellation, and
//! the [`DependencyValidator`] checks that the tools an adapter needs are
//! installed before anything is spawned.

#![warn(missing_docs)]

pub mod adapter;
pub mod android;
pub mod apple;
pub mod custom;
pub mod error;
pub mod request;
pub mod runner;
pub mod validator;
pub mod web;
pub mod windows;

pub use adapter::{AdapterRegistry, ToolchainAdapter};
pub use error::ToolchainError;
pub use request::{Artifacts, BuildRequest, CommandSpec};
pub use runner::{ProcessOutput, ProcessRunner, RunOptions, STDERR_TAIL_LINES};
pub use validator::{
    compare_versions, parse_version, DependencyValidator, ToolRequirement, ToolStatus,
    ValidationReport,
};
