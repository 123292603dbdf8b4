//! Applying downloaded translations onto localized content
//!
//! For each completed task the pipeline runs the stages of [`ApplyStage`] in
//! order. The translated payload holds values for the task's source item and for
//! nested items reachable from it. Values are written into the target-locale
//! copies of those items, creating the copies when they do not exist yet, and the
//! links between the copies are rewritten so the localized graph only points at
//! localized items.

use super::payload::{apply_translations, parse_payload};
use super::{Locale, Submission, Task, TaskApi, TranslatedPayload, TranslationEntry};
use crate::config::Config;
use crate::content::{
    BodyPath, CircularMode, ContentClient, ContentItem, ContentReplacer, ContentSource,
    all_localizations, deep_copy, identify_content_dependencies, update_dependency,
};
use crate::error::{Error, Result};
use crate::parallel::parallel_process;
use crate::progress::{ProgressContext, ProgressList};
use crate::retry::with_retry_progress;
use crate::types::{ApplyOutcome, ApplyStage, ApplySummary};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Runs the apply pipeline for translation tasks
///
/// Cheap to clone; clones share the content client, task API and configuration.
#[derive(Clone)]
pub struct TranslationApplier {
    content: Arc<dyn ContentClient>,
    tasks: Arc<dyn TaskApi>,
    config: Arc<Config>,
}

impl TranslationApplier {
    /// Create an applier
    pub fn new(content: Arc<dyn ContentClient>, tasks: Arc<dyn TaskApi>, config: Config) -> Self {
        Self {
            content,
            tasks,
            config: Arc::new(config),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn retry<T, F, Fut>(&self, progress: Option<&ProgressContext>, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry_progress(&self.config.retry, progress, operation).await
    }

    /// Every completed task of a submission, following pagination
    pub async fn completed_tasks(&self, submission_id: i64) -> Result<Vec<Task>> {
        let mut completed = Vec::new();
        let mut seen: u64 = 0;
        let mut page = 1;

        loop {
            let result = self
                .retry(None, || self.tasks.get_tasks(submission_id, page))
                .await?;
            let received = result.tasks_list.len();
            seen += received as u64;
            completed.extend(result.tasks_list.into_iter().filter(Task::is_completed));

            if received == 0 || seen >= result.total_records_count {
                break;
            }
            page += 1;
        }

        tracing::debug!(submission_id, completed = completed.len(), "Collected completed tasks");
        Ok(completed)
    }

    /// A progress list sized for applying `task_count` tasks of `submission`
    pub fn progress_list(&self, submission: &Submission, task_count: usize) -> ProgressList {
        ProgressList::new(
            task_count,
            self.config.apply.max_parallel_tasks,
            Some(format!(
                "Applying translations for {}",
                display_name(submission)
            )),
        )
    }

    /// Apply every completed task of a submission
    ///
    /// Runs up to `apply.max_parallel_tasks` tasks at once and stops starting new
    /// tasks after the first failure.
    pub async fn apply_all(&self, submission: &Submission) -> Result<ApplySummary> {
        let tasks = self.completed_tasks(submission.submission_id).await?;
        let progress = self.progress_list(submission, tasks.len());
        self.apply_tasks(submission, tasks, &progress).await
    }

    /// Apply the given tasks, reporting into `progress`
    ///
    /// Use together with [`Self::progress_list`] to subscribe to progress before
    /// work starts.
    pub async fn apply_tasks(
        &self,
        submission: &Submission,
        tasks: Vec<Task>,
        progress: &ProgressList,
    ) -> Result<ApplySummary> {
        tracing::info!(
            submission_id = submission.submission_id,
            tasks = tasks.len(),
            "Applying translations"
        );

        let outcomes = Mutex::new(Vec::new());
        // Errored slots stay visible until every in-flight task has settled
        let failed = Mutex::new(Vec::new());
        let source_locale = submission.source_locale.as_ref();

        parallel_process(
            tasks,
            self.config.apply.max_parallel_tasks,
            |task, index| {
                let outcomes = &outcomes;
                let failed = &failed;
                async move {
                    tracing::debug!(task_id = task.task_id, index, "Starting task");
                    let ctx = progress.create_context(task_title(&task), ApplyStage::COUNT)?;
                    let locale = source_locale.or(task.source_locale.as_ref());
                    match self.apply_task_with_progress(&task, locale, Some(&ctx)).await {
                        Ok(outcome) => {
                            ctx.free();
                            outcomes
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .push(outcome);
                            Ok::<(), Error>(())
                        }
                        Err(e) => {
                            failed.lock().unwrap_or_else(|e| e.into_inner()).push(ctx);
                            Err(e)
                        }
                    }
                }
            },
        )
        .await?;
        drop(failed);

        Ok(ApplySummary {
            submission_id: submission.submission_id,
            applied: outcomes.into_inner().unwrap_or_else(|e| e.into_inner()),
        })
    }

    /// Apply a single task
    ///
    /// `source_locale` is the locale of the submitted content; it falls back to
    /// the task's own source locale.
    pub async fn apply_task(&self, task: &Task, source_locale: Option<&Locale>) -> Result<ApplyOutcome> {
        let locale = source_locale.or(task.source_locale.as_ref());
        self.apply_task_with_progress(task, locale, None).await
    }

    /// Apply a single task, reporting stages and retries on `progress`
    ///
    /// On failure the error is reported to the task system (best effort) and
    /// returned wrapped in [`Error::TaskFailed`].
    pub async fn apply_task_with_progress(
        &self,
        task: &Task,
        source_locale: Option<&Locale>,
        progress: Option<&ProgressContext>,
    ) -> Result<ApplyOutcome> {
        match self.run_pipeline(task, source_locale, progress).await {
            Ok(outcome) => {
                tracing::info!(
                    task_id = task.task_id,
                    content_id = %outcome.source_id,
                    localized_id = %outcome.localized_id,
                    locale = %outcome.locale,
                    "Translation applied"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(task_id = task.task_id, error = %e, "Failed to apply translation");
                if let Some(progress) = progress {
                    progress.set_error(&e);
                }

                let message = e.display_message();
                if let Err(report) = self
                    .retry(progress, || self.tasks.error_task(task.task_id, &message))
                    .await
                {
                    tracing::warn!(
                        task_id = task.task_id,
                        error = %report,
                        "Failed to report task error"
                    );
                }

                Err(Error::TaskFailed {
                    task_id: task.task_id,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Cancel a task
    pub async fn cancel_task(&self, task_id: i64) -> Result<()> {
        tracing::info!(task_id, "Cancelling task");
        self.retry(None, || self.tasks.cancel_task(task_id)).await
    }

    /// Assign the configured `in_progress` workflow state to freshly submitted items
    ///
    /// Does nothing when `apply.statuses.in_progress` is unset.
    pub async fn mark_submitted(&self, content_ids: &[String]) -> Result<()> {
        let Some(state) = self.config.apply.statuses.in_progress.as_deref() else {
            return Ok(());
        };

        for id in content_ids {
            let item = self.retry(None, || self.content.fetch_item(id)).await?;
            self.retry(None, || self.content.assign_workflow_state(&item, state))
                .await?;
        }
        tracing::info!(items = content_ids.len(), state, "Marked submitted items");
        Ok(())
    }

    async fn run_pipeline(
        &self,
        task: &Task,
        source_locale: Option<&Locale>,
        progress: Option<&ProgressContext>,
    ) -> Result<ApplyOutcome> {
        let task_id = task.task_id;
        let locale = task.target_locale.locale.as_str();
        let enter = |stage: ApplyStage| {
            tracing::info!(task_id, stage = %stage, "Entering stage");
            if let Some(progress) = progress {
                progress.set_stage(stage.number(), stage.name(), stage.fraction());
            }
        };

        enter(ApplyStage::Downloading);
        let raw = self
            .retry(progress, || self.tasks.download_task(task_id))
            .await?;
        let payload = parse_payload(&raw)?;

        enter(ApplyStage::ResolvingTargetItem);
        let source = self
            .retry(progress, || self.content.fetch_item(&task.unique_identifier))
            .await?;
        let target = self.find_or_create_localization(&source, locale, progress).await?;

        enter(ApplyStage::ApplyingTranslations);
        let replacer = LocalizingReplacer {
            applier: self,
            root_id: source.id.clone(),
            locale,
            source_locale: source_locale.map(|l| l.locale.as_str()),
            payload: &payload,
            progress,
            localized: Mutex::new(HashMap::from([(source.id.clone(), target)])),
        };
        let fetcher = RetryingSource {
            applier: self,
            progress,
        };
        let mapping = deep_copy(
            std::slice::from_ref(&source.id),
            &fetcher,
            &replacer,
            CircularMode::Repeat,
        )
        .await?;
        let localized = replacer
            .counterpart(&source.id)
            .ok_or_else(|| Error::Other(format!("localized copy of {} went missing", source.id)))?;

        enter(ApplyStage::UpdatingMetadata);
        let metadata = json!({ "localizedId": localized.id });
        self.retry(progress, || {
            self.tasks.update_task_metadata(task_id, metadata.clone())
        })
        .await?;

        enter(ApplyStage::UpdatingWorkflowState);
        if let Some(state) = self.config.apply.statuses.translated.as_deref() {
            for item in [&source, &localized] {
                self.retry(progress, || self.content.assign_workflow_state(item, state))
                    .await?;
            }
        }

        enter(ApplyStage::ConfirmingCompletion);
        self.retry(progress, || self.tasks.confirm_download(task_id))
            .await?;

        Ok(ApplyOutcome {
            task_id,
            source_id: source.id,
            localized_id: localized.id,
            locale: locale.to_string(),
            mapping,
        })
    }

    /// The `locale` copy of `item`, if one exists, in full
    async fn find_localization(
        &self,
        item: &ContentItem,
        locale: &str,
        progress: Option<&ProgressContext>,
    ) -> Result<Option<ContentItem>> {
        let page_size = self.config.apply.localization_page_size;
        let all = self
            .retry(progress, || all_localizations(self.content.as_ref(), item, page_size))
            .await?;

        match all.into_iter().find(|l| l.locale.as_deref() == Some(locale)) {
            Some(found) => {
                let full = self
                    .retry(progress, || self.content.fetch_item(&found.id))
                    .await?;
                Ok(Some(full))
            }
            None => Ok(None),
        }
    }

    async fn find_or_create_localization(
        &self,
        item: &ContentItem,
        locale: &str,
        progress: Option<&ProgressContext>,
    ) -> Result<ContentItem> {
        match self.find_localization(item, locale, progress).await? {
            Some(found) => Ok(found),
            None => self.localize_and_wait(item, locale, progress).await,
        }
    }

    /// Request a `locale` copy of `item` and poll until it is listed
    async fn localize_and_wait(
        &self,
        item: &ContentItem,
        locale: &str,
        progress: Option<&ProgressContext>,
    ) -> Result<ContentItem> {
        tracing::info!(content_id = %item.id, locale, "Requesting localization");
        let locales = [locale.to_string()];
        self.retry(progress, || self.content.localize(item, &locales))
            .await?;

        let poll_interval = self.config.apply.poll_interval;
        let started = tokio::time::Instant::now();
        let mut polls: u32 = 0;
        loop {
            if let Some(found) = self.find_localization(item, locale, progress).await? {
                tracing::debug!(content_id = %item.id, locale, polls, "Localization available");
                return Ok(found);
            }

            if let Some(timeout) = self.config.apply.poll_timeout
                && started.elapsed() >= timeout
            {
                return Err(Error::LocalizationPending {
                    id: item.id.clone(),
                    locale: locale.to_string(),
                });
            }

            polls += 1;
            if let Some(progress) = progress {
                progress.set_text(format!("Waiting for {locale} copy of {}", item.label));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Store `item`, re-fetching and retrying once on a version conflict
    async fn update_with_refetch(
        &self,
        item: &ContentItem,
        progress: Option<&ProgressContext>,
    ) -> Result<ContentItem> {
        match self.retry(progress, || self.content.update_item(item)).await {
            Err(Error::VersionConflict { id }) => {
                tracing::warn!(content_id = %id, "Version conflict, retrying with latest version");
                let latest = self
                    .retry(progress, || self.content.fetch_item(&item.id))
                    .await?;
                let rebased = ContentItem {
                    body: item.body.clone(),
                    ..latest
                };
                self.retry(progress, || self.content.update_item(&rebased))
                    .await
            }
            other => other,
        }
    }
}

fn display_name(submission: &Submission) -> String {
    if submission.submission_name.is_empty() {
        format!("submission {}", submission.submission_id)
    } else {
        submission.submission_name.clone()
    }
}

fn task_title(task: &Task) -> String {
    let name = if task.name.is_empty() {
        &task.unique_identifier
    } else {
        &task.name
    };
    format!("{name} ({})", task.target_locale.locale)
}

/// `_meta` keys that belong to the localized copy rather than its source
const LOCALIZED_META_KEYS: &[&str] = &["deliveryKey", "locale"];

/// Content fetches with retry, used for the deep-copy traversal
struct RetryingSource<'a> {
    applier: &'a TranslationApplier,
    progress: Option<&'a ProgressContext>,
}

#[async_trait]
impl ContentSource for RetryingSource<'_> {
    async fn fetch_item(&self, id: &str) -> Result<ContentItem> {
        self.applier
            .retry(self.progress, || self.applier.content.fetch_item(id))
            .await
    }
}

/// Replaces each source item with its translated target-locale copy
struct LocalizingReplacer<'a> {
    applier: &'a TranslationApplier,
    root_id: String,
    locale: &'a str,
    source_locale: Option<&'a str>,
    payload: &'a TranslatedPayload,
    progress: Option<&'a ProgressContext>,
    /// Latest stored copy per source id
    localized: Mutex<HashMap<String, ContentItem>>,
}

impl LocalizingReplacer<'_> {
    fn counterpart(&self, source_id: &str) -> Option<ContentItem> {
        self.localized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source_id)
            .cloned()
    }

    fn counterpart_ids(&self) -> HashMap<String, String> {
        self.localized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(source, copy)| (source.clone(), copy.id.clone()))
            .collect()
    }

    fn entries_for(&self, original: &ContentItem) -> Option<&[TranslationEntry]> {
        if original.id == self.root_id {
            Some(&self.payload.translations)
        } else {
            self.payload.nested.get(&original.id).map(Vec::as_slice)
        }
    }

    /// Whether a nested item takes part in localization
    fn is_eligible(&self, original: &ContentItem, has_translations: bool) -> bool {
        match (original.locale.as_deref(), self.source_locale) {
            (Some(item_locale), Some(source_locale)) => item_locale == source_locale,
            (None, Some(_)) => has_translations,
            (_, None) => false,
        }
    }

    /// Find or create the target-locale copy of a nested item
    async fn resolve_nested(
        &self,
        original: &ContentItem,
        has_translations: bool,
    ) -> Result<Option<ContentItem>> {
        if let Some(existing) = self.counterpart(&original.id) {
            return Ok(Some(existing));
        }

        let applier = self.applier;
        if let Some(found) = applier
            .find_localization(original, self.locale, self.progress)
            .await?
        {
            return Ok(Some(found));
        }
        if !has_translations {
            return Ok(None);
        }

        let mut item = original.clone();
        if item.locale.is_none()
            && let Some(source_locale) = self.source_locale
        {
            tracing::debug!(content_id = %item.id, locale = source_locale, "Assigning source locale");
            item = applier
                .retry(self.progress, || applier.content.set_locale(&item, source_locale))
                .await?;
        }

        let created = applier
            .localize_and_wait(&item, self.locale, self.progress)
            .await?;
        Ok(Some(created))
    }

    /// Body for the copy: the source's current fields over the copy's own,
    /// translations, delivery key, and edges pointing at localized copies
    ///
    /// Fields the source no longer carries keep the copy's value. Inside `_meta`
    /// the copy keeps its locale-specific keys.
    fn merge_body(
        &self,
        original: &ContentItem,
        target: &ContentItem,
        rewritten: &Value,
        entries: &[TranslationEntry],
    ) -> Result<Value> {
        let mut body = target.body.clone();
        if let (Value::Object(merged), Value::Object(source)) = (&mut body, rewritten) {
            for (key, value) in source {
                match (key.as_str(), merged.get_mut(key), value) {
                    ("_meta", Some(Value::Object(meta)), Value::Object(source_meta)) => {
                        for (meta_key, meta_value) in source_meta {
                            if !LOCALIZED_META_KEYS.contains(&meta_key.as_str()) {
                                meta.insert(meta_key.clone(), meta_value.clone());
                            }
                        }
                    }
                    _ => {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        apply_translations(&mut body, entries, original.id == self.root_id)?;

        let counterparts = self.counterpart_ids();
        let snapshot = ContentItem::new(target.id.clone(), body.clone());
        for dep in identify_content_dependencies(&snapshot) {
            if let Some(copy_id) = dep
                .dependency
                .id
                .as_deref()
                .and_then(|id| counterparts.get(id))
            {
                update_dependency(&mut body, &dep, Some(copy_id));
            }
        }

        if let Some(key) = original.delivery_key() {
            let suffix = format!("_{}", self.locale);
            let localized_key = if key.ends_with(&suffix) {
                key.to_string()
            } else {
                format!("{key}{suffix}")
            };
            BodyPath::keys(["_meta", "deliveryKey"]).set(&mut body, Value::String(localized_key))?;
        }

        Ok(body)
    }
}

#[async_trait]
impl ContentReplacer for LocalizingReplacer<'_> {
    async fn replace(&self, original: &ContentItem, body: Value) -> Result<ContentItem> {
        let entries = self.entries_for(original).unwrap_or_default();
        let is_root = original.id == self.root_id;

        let target = if is_root {
            self.counterpart(&original.id)
        } else if self.is_eligible(original, !entries.is_empty()) {
            self.resolve_nested(original, !entries.is_empty()).await?
        } else {
            None
        };

        let Some(target) = target else {
            tracing::debug!(content_id = %original.id, "Keeping item as is");
            return Ok(original.clone());
        };

        if let Some(progress) = self.progress {
            progress.set_text(format!("Updating {} ({})", original.label, self.locale));
        }

        let merged = self.merge_body(original, &target, &body, entries)?;
        let candidate = ContentItem {
            body: merged,
            ..target
        };
        let stored = self
            .applier
            .update_with_refetch(&candidate, self.progress)
            .await?;

        tracing::debug!(
            content_id = %original.id,
            localized_id = %stored.id,
            translations = entries.len(),
            "Updated localized item"
        );
        self.localized
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(original.id.clone(), stored.clone());
        Ok(stored)
    }
}
