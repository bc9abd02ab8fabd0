//! Build orchestration: validation, graphing, fingerprinting, cache lookup
//! and parallel toolchain dispatch.
//!
//! [`Scheduler::build`] runs one orchestration pass over a set of
//! [`BuildRequest`](forge_toolchain::BuildRequest)s and returns a
//! [`BuildReport`](forge_report::BuildReport). [`plan_requests`] turns a
//! loaded `forge.toml` into those requests.

#![warn(missing_docs)]

pub mod error;
pub mod options;
mod pipeline;
pub mod plan;
pub mod scheduler;

pub use error::{BuildError, SourceFailure};
pub use options::BuildOptions;
pub use plan::{plan_requests, ConfigOverrides};
pub use scheduler::Scheduler;
