//! Per-invocation pipeline outcome.

use serde::Serialize;

use crate::error::{ItemFailure, PipelineError};
use crate::paths::StorageKey;
use crate::types::OutputSpec;

/// How the original was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginalStatus {
    /// Fetched from the source and stored
    Downloaded,
    /// Already in storage; the source was not contacted
    Skipped,
}

/// What happened to one requested output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum Outcome {
    Generated,
    AlreadyPresent,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Outcome of one output spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    /// Canonical output token
    #[serde(rename = "output")]
    pub spec: String,
    /// Storage key of the derivative
    pub key: StorageKey,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ItemReport {
    pub(crate) fn new(spec: &OutputSpec, key: StorageKey, outcome: Outcome) -> Self {
        Self {
            spec: spec.to_string(),
            key,
            outcome,
        }
    }
}

/// Aggregated result of one orchestrator run, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub original: OriginalStatus,
    pub items: Vec<ItemReport>,
}

impl PipelineReport {
    /// True when every item was generated or already present.
    pub fn is_success(&self) -> bool {
        self.items.iter().all(|i| i.outcome.is_success())
    }

    /// True when nothing was generated and nothing failed.
    pub fn all_already_present(&self) -> bool {
        self.items
            .iter()
            .all(|i| i.outcome == Outcome::AlreadyPresent)
    }

    pub fn generated(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|i| i.outcome == Outcome::Generated)
    }

    pub fn failures(&self) -> Vec<ItemFailure> {
        self.items
            .iter()
            .filter_map(|i| match &i.outcome {
                Outcome::Failed(reason) => Some(ItemFailure {
                    output: i.spec.clone(),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Outputs that now exist in storage.
    pub fn succeeded(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| i.outcome.is_success())
            .map(|i| i.spec.clone())
            .collect()
    }

    /// `Ok(self)` if every item succeeded, otherwise a composite error.
    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PipelineError::PartialFailure {
                failures: self.failures(),
                succeeded: self.succeeded(),
            })
        }
    }
}
