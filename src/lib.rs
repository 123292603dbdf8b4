//! # translation-apply
//!
//! Library for writing translated field values from a translation task system
//! back onto a linked graph of content items.
//!
//! ## Design Philosophy
//!
//! translation-apply is designed to be:
//! - **Graph-aware** - Links, references and hierarchy parents are followed,
//!   cycles included, and rewritten so localized items point at each other
//! - **Resilient** - Remote calls retry with exponential backoff; stale versions
//!   are re-fetched once
//! - **Observable** - Consumers subscribe to progress snapshots, no polling required
//! - **Library-first** - Remote services are reached through async traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use translation_apply::{Config, HttpTaskApi, Submission, TranslationApplier};
//! # use translation_apply::content::ContentClient;
//! # fn content_client() -> Arc<dyn ContentClient> { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json(r#"{
//!         "api": { "base_url": "https://connector.example.com/api/v3/",
//!                  "api_key": "key", "connector_key": "cms" },
//!         "apply": { "statuses": { "translated": "wf-translated" } }
//!     }"#)?;
//!
//!     let tasks = Arc::new(HttpTaskApi::new(&config.api)?);
//!     let applier = TranslationApplier::new(content_client(), tasks, config);
//!
//!     let submission = Submission { submission_id: 42, ..Default::default() };
//!     let summary = applier.apply_all(&submission).await?;
//!     println!("applied {} tasks", summary.applied.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Content items, dependency graph and deep copy
pub mod content;
/// Error types
pub mod error;
/// Bounded-concurrency work queue
pub mod parallel;
/// Progress slots for concurrent work
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Translation tasks and applying them
pub mod tasks;
/// Core types
pub mod types;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{ApplyConfig, Config, RetryConfig, TaskApiConfig, WorkflowStatuses};
pub use content::{
    CircularMode, ContentClient, ContentDependencyTree, ContentItem, ContentReplacer,
    ContentSource, deep_copy,
};
pub use error::{Error, Result};
pub use parallel::parallel_process;
pub use progress::{LoadList, ProgressContext, ProgressList};
pub use retry::{IsRetryable, with_retry, with_retry_progress};
pub use tasks::api::HttpTaskApi;
pub use tasks::apply::TranslationApplier;
pub use tasks::{
    Locale, Submission, Task, TaskApi, TranslatableFields, TranslatedPayload, TranslationEntry,
    collect_source_payload, prune_selection,
};
pub use types::{ApplyOutcome, ApplyStage, ApplySummary};
