//! Core types shared by the apply pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stage of the per-task apply pipeline
///
/// Stages always run in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStage {
    /// Downloading the translated payload
    Downloading,
    /// Finding (or creating) the localized copy of the source item
    ResolvingTargetItem,
    /// Applying translations across the dependency closure
    ApplyingTranslations,
    /// Writing the localized id into the remote task metadata
    UpdatingMetadata,
    /// Moving source and localized items to the "translated" workflow state
    UpdatingWorkflowState,
    /// Confirming the download with the remote task system
    ConfirmingCompletion,
}

impl ApplyStage {
    /// All stages in execution order
    pub const ALL: [ApplyStage; 6] = [
        ApplyStage::Downloading,
        ApplyStage::ResolvingTargetItem,
        ApplyStage::ApplyingTranslations,
        ApplyStage::UpdatingMetadata,
        ApplyStage::UpdatingWorkflowState,
        ApplyStage::ConfirmingCompletion,
    ];

    /// Number of stages, used as the progress stage total
    pub const COUNT: u32 = Self::ALL.len() as u32;

    /// One-based stage number for progress display
    pub fn number(&self) -> u32 {
        match self {
            ApplyStage::Downloading => 1,
            ApplyStage::ResolvingTargetItem => 2,
            ApplyStage::ApplyingTranslations => 3,
            ApplyStage::UpdatingMetadata => 4,
            ApplyStage::UpdatingWorkflowState => 5,
            ApplyStage::ConfirmingCompletion => 6,
        }
    }

    /// Display name for progress dialogs
    pub fn name(&self) -> &'static str {
        match self {
            ApplyStage::Downloading => "Downloading translation",
            ApplyStage::ResolvingTargetItem => "Resolving localized item",
            ApplyStage::ApplyingTranslations => "Applying translations",
            ApplyStage::UpdatingMetadata => "Updating task metadata",
            ApplyStage::UpdatingWorkflowState => "Updating workflow state",
            ApplyStage::ConfirmingCompletion => "Confirming download",
        }
    }

    /// Fraction of the pipeline completed once this stage starts (0.0 to 1.0)
    pub fn fraction(&self) -> f64 {
        f64::from(self.number() - 1) / f64::from(Self::COUNT)
    }
}

impl std::fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of applying a single task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Remote task id
    pub task_id: i64,
    /// Source content item id
    pub source_id: String,
    /// Localized content item that received the root translations
    pub localized_id: String,
    /// Target locale
    pub locale: String,
    /// Deep-copy mapping of every visited source id to the id now used in its place
    pub mapping: HashMap<String, String>,
}

/// Result of applying every completed task of a submission
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    /// Submission the tasks belong to
    pub submission_id: i64,
    /// Outcomes of the applied tasks, in completion order
    pub applied: Vec<ApplyOutcome>,
}
