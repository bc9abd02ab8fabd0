//! Immutable, serializable records of build runs.
//!
//! The scheduler fills in one [`StepReport`] per target and assembles them
//! into a [`BuildReport`]; [`ReportStore`] keeps finished reports on disk so
//! past runs can be listed.

#![warn(missing_docs)]

pub mod error;
pub mod report;
pub mod step;
pub mod store;

pub use error::ReportError;
pub use report::{BuildReport, RunId};
pub use step::{CacheOutcome, StepPhase, StepReport, StepStatus};
pub use store::{ReportStore, REPORTS_DIR};
