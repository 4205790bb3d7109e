//! Derivative pipeline.
//!
//! - **orchestrator**: fetch-once, generate-missing batch processing
//! - **report**: per-output outcomes of one run

pub mod orchestrator;
pub mod report;

pub use orchestrator::{Orchestrator, OrchestratorOptions, PipelineRequest};
pub use report::{ItemReport, OriginalStatus, Outcome, PipelineReport};
