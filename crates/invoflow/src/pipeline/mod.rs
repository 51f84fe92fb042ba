//! The two-stage processing pipeline: extraction, then renaming.

pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod naming;
pub mod rename;
pub mod runner;
pub mod stage;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use extract::ExtractStage;
pub use naming::{compute_new_name, MISSING_FIELDS_REASON};
pub use rename::RenameStage;
pub use runner::{Pipeline, TaskDisposition, TaskResult};
pub use stage::{Stage, StageOutcome};
