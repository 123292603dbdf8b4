//! Remote translation tasks
//!
//! The task system hands out one task per (content item, target locale) pair of a
//! submission. Completed tasks carry a translated payload that [`apply`] writes
//! back onto localized copies of the source content.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub mod api;
pub mod apply;
pub mod payload;
pub mod submission;

pub use api::HttpTaskApi;
pub use apply::TranslationApplier;
pub use payload::parse_payload;
pub use submission::{TranslatableFields, collect_source_payload, prune_selection};

/// Status reported for tasks whose translation is ready for download
pub const COMPLETED_STATUS: &str = "Completed";

/// A locale as reported by the task system
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Locale code, e.g. `de-DE`
    pub locale: String,
    /// Human-readable name
    #[serde(default)]
    pub locale_display_name: String,
}

impl Locale {
    /// Locale with no display name
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            locale_display_name: String::new(),
        }
    }
}

/// A translation task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task id
    pub task_id: i64,
    /// Id of the source content item
    #[serde(default)]
    pub unique_identifier: String,
    /// Task status, see [`COMPLETED_STATUS`]
    #[serde(default)]
    pub status: String,
    /// Locale the task translates into
    pub target_locale: Locale,
    /// Locale of the source content
    #[serde(default)]
    pub source_locale: Option<Locale>,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Submission the task belongs to
    #[serde(default)]
    pub submission_id: Option<i64>,
    /// Id of the uploaded source file
    #[serde(default)]
    pub content_id: Option<String>,
    /// Last error reported for this task
    #[serde(default)]
    pub error_message: Option<String>,
    /// Metadata attached through `update_task_metadata`
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Task {
    /// Whether the translation is ready to be applied
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_STATUS
    }
}

/// A submission: the set of tasks created for one request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission id
    pub submission_id: i64,
    /// Locale of the submitted content
    #[serde(default)]
    pub source_locale: Option<Locale>,
    /// Display name
    #[serde(default)]
    pub submission_name: String,
}

/// One page of a submission's tasks
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPage {
    /// One-based page number
    #[serde(default)]
    pub current_page_number: u32,
    /// Number of pages
    #[serde(default)]
    pub total_result_pages_count: u32,
    /// Number of tasks across all pages
    #[serde(default)]
    pub total_records_count: u64,
    /// Tasks on this page
    #[serde(default)]
    pub tasks_list: Vec<Task>,
}

/// A single translated (or translatable) field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranslationEntry {
    /// Path of the field inside the body, e.g. `title` or `slides[0].caption`
    pub key: String,
    /// Field value
    pub value: Value,
}

impl TranslationEntry {
    /// Create an entry
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Field values for a root item and the nested items it links to
///
/// Sent to the task system as the source file of a task and returned, translated,
/// by [`TaskApi::download_task`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslatedPayload {
    /// Entries for the root item
    #[serde(default)]
    pub translations: Vec<TranslationEntry>,
    /// Entries for nested items, by source content item id
    #[serde(default)]
    pub nested: HashMap<String, Vec<TranslationEntry>>,
    /// Label of the root item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Preview URL of the root item
    #[serde(
        default,
        rename = "contextUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub context_url: Option<String>,
}

/// Operations against the remote translation task system
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Raw translated payload of a task
    async fn download_task(&self, task_id: i64) -> Result<String>;

    /// Attach metadata to a task
    async fn update_task_metadata(&self, task_id: i64, metadata: Value) -> Result<()>;

    /// Tell the task system the translation was applied
    async fn confirm_download(&self, task_id: i64) -> Result<()>;

    /// Report a failure for a task
    async fn error_task(&self, task_id: i64, message: &str) -> Result<()>;

    /// Cancel a task
    async fn cancel_task(&self, task_id: i64) -> Result<()>;

    /// One page (one-based) of a submission's tasks
    async fn get_tasks(&self, submission_id: i64, page: u32) -> Result<TaskPage>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
