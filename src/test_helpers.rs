//! In-memory collaborators shared by unit tests

use crate::content::dependency::{CONTENT_LINK_SCHEMA, CONTENT_REFERENCE_SCHEMA};
use crate::content::{ContentClient, ContentItem, ContentSource, Page, PageInfo};
use crate::error::{Error, Result};
use crate::tasks::{Locale, Task, TaskApi, TaskPage};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;

/// Schema used for test page bodies
pub(crate) const PAGE_SCHEMA: &str = "https://example.com/page";

/// A content link object pointing at `id`
pub(crate) fn link(id: &str) -> Value {
    json!({
        "_meta": { "schema": CONTENT_LINK_SCHEMA },
        "contentType": "https://example.com/card",
        "id": id
    })
}

/// A content reference object pointing at `id`
pub(crate) fn reference(id: &str) -> Value {
    json!({
        "_meta": { "schema": CONTENT_REFERENCE_SCHEMA },
        "contentType": "https://example.com/card",
        "id": id
    })
}

/// An item with a page schema and the given top-level fields
pub(crate) fn page(id: &str, fields: Value) -> ContentItem {
    let mut body = fields;
    if let Value::Object(map) = &mut body {
        map.insert("_meta".to_string(), json!({ "schema": PAGE_SCHEMA }));
    }
    ContentItem::new(id, body).with_label(id)
}

#[derive(Default)]
struct ContentState {
    items: HashMap<String, ContentItem>,
    /// Visible localized copies per source id
    localizations: HashMap<String, Vec<String>>,
    /// Copies requested but not yet listed: (source id, copy id, listings left)
    pending: Vec<(String, String, u32)>,
    fetches: HashMap<String, usize>,
    updates: Vec<ContentItem>,
    conflicts: HashMap<String, u32>,
    workflow: Vec<(String, String)>,
    localize_calls: Vec<(String, Vec<String>)>,
    set_locale_calls: Vec<(String, String)>,
    page_requests: usize,
    localize_delay: u32,
}

/// In-memory content service with versioning and delayed localization
#[derive(Default)]
pub(crate) struct MemoryContent {
    state: Mutex<ContentState>,
}

impl MemoryContent {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ContentState> {
        self.state.lock().unwrap()
    }

    /// Store an item, giving it version 1 when it has none
    pub(crate) fn insert(&self, mut item: ContentItem) -> ContentItem {
        item.version.get_or_insert(1);
        self.state().items.insert(item.id.clone(), item.clone());
        item
    }

    /// Store an existing localized copy of `source`
    pub(crate) fn insert_localization(
        &self,
        source: &ContentItem,
        locale: &str,
        body: Value,
    ) -> ContentItem {
        let copy = self.insert(
            ContentItem::new(format!("{}-{}", source.id, locale), body)
                .with_locale(locale)
                .with_label(source.label.clone()),
        );
        self.state()
            .localizations
            .entry(source.id.clone())
            .or_default()
            .push(copy.id.clone());
        copy
    }

    /// Newly requested copies show up only after this many listings
    pub(crate) fn set_localize_delay(&self, listings: u32) {
        self.state().localize_delay = listings;
    }

    /// Make the next `times` updates of `id` fail with a version conflict
    pub(crate) fn conflict_on_update(&self, id: &str, times: u32) {
        self.state().conflicts.insert(id.to_string(), times);
    }

    pub(crate) fn get(&self, id: &str) -> Option<ContentItem> {
        self.state().items.get(id).cloned()
    }

    pub(crate) fn fetch_count(&self, id: &str) -> usize {
        self.state().fetches.get(id).copied().unwrap_or_default()
    }

    pub(crate) fn localization_page_requests(&self) -> usize {
        self.state().page_requests
    }

    /// Ids of every stored update, in order
    pub(crate) fn updated_ids(&self) -> Vec<String> {
        self.state().updates.iter().map(|i| i.id.clone()).collect()
    }

    pub(crate) fn workflow_assignments(&self) -> Vec<(String, String)> {
        self.state().workflow.clone()
    }

    pub(crate) fn localize_calls(&self) -> Vec<(String, Vec<String>)> {
        self.state().localize_calls.clone()
    }

    pub(crate) fn set_locale_calls(&self) -> Vec<(String, String)> {
        self.state().set_locale_calls.clone()
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn fetch_item(&self, id: &str) -> Result<ContentItem> {
        let mut state = self.state();
        *state.fetches.entry(id.to_string()).or_default() += 1;
        state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("content item {id}")))
    }
}

#[async_trait]
impl ContentClient for MemoryContent {
    async fn localizations(
        &self,
        item: &ContentItem,
        page: u32,
        size: u32,
    ) -> Result<Page<ContentItem>> {
        let mut state = self.state();
        state.page_requests += 1;

        let mut ready = Vec::new();
        for pending in state.pending.iter_mut() {
            if pending.0 == item.id {
                if pending.2 == 0 {
                    ready.push(pending.1.clone());
                } else {
                    pending.2 -= 1;
                }
            }
        }
        state.pending.retain(|p| !ready.contains(&p.1));
        if !ready.is_empty() {
            state
                .localizations
                .entry(item.id.clone())
                .or_default()
                .extend(ready);
        }

        let ids = state.localizations.get(&item.id).cloned().unwrap_or_default();
        let total = ids.len();
        let start = (page * size) as usize;
        let items: Vec<ContentItem> = ids
            .iter()
            .skip(start)
            .take(size as usize)
            .filter_map(|id| state.items.get(id))
            // Listings carry summaries only
            .map(|i| ContentItem {
                body: Value::Null,
                ..i.clone()
            })
            .collect();

        Ok(Page {
            items,
            page: PageInfo {
                number: page,
                size,
                total_elements: total as u64,
                total_pages: total.div_ceil(size.max(1) as usize) as u32,
            },
        })
    }

    async fn localize(&self, item: &ContentItem, locales: &[String]) -> Result<()> {
        let mut state = self.state();
        state
            .localize_calls
            .push((item.id.clone(), locales.to_vec()));

        let source = state
            .items
            .get(&item.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("content item {}", item.id)))?;
        if source.locale.is_none() {
            return Err(Error::Api {
                status: 400,
                message: "item has no locale".to_string(),
                body: None,
            });
        }

        let delay = state.localize_delay;
        for locale in locales {
            let copy = ContentItem {
                id: format!("{}-{}", source.id, locale),
                locale: Some(locale.clone()),
                version: Some(1),
                ..source.clone()
            };
            state.items.insert(copy.id.clone(), copy.clone());
            state.pending.push((source.id.clone(), copy.id, delay));
        }
        Ok(())
    }

    async fn set_locale(&self, item: &ContentItem, locale: &str) -> Result<ContentItem> {
        let mut state = self.state();
        state
            .set_locale_calls
            .push((item.id.clone(), locale.to_string()));
        let stored = state
            .items
            .get_mut(&item.id)
            .ok_or_else(|| Error::NotFound(format!("content item {}", item.id)))?;
        stored.locale = Some(locale.to_string());
        stored.version = stored.version.map(|v| v + 1);
        Ok(stored.clone())
    }

    async fn update_item(&self, item: &ContentItem) -> Result<ContentItem> {
        let mut state = self.state();

        if let Some(left) = state.conflicts.get_mut(&item.id)
            && *left > 0
        {
            *left -= 1;
            if let Some(stored) = state.items.get_mut(&item.id) {
                stored.version = stored.version.map(|v| v + 1);
            }
            return Err(Error::VersionConflict {
                id: item.id.clone(),
            });
        }

        let stored = state
            .items
            .get(&item.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("content item {}", item.id)))?;
        if stored.version != item.version {
            return Err(Error::VersionConflict {
                id: item.id.clone(),
            });
        }

        let updated = ContentItem {
            version: item.version.map(|v| v + 1),
            ..item.clone()
        };
        state.items.insert(updated.id.clone(), updated.clone());
        state.updates.push(updated.clone());
        Ok(updated)
    }

    async fn assign_workflow_state(
        &self,
        item: &ContentItem,
        state_id: &str,
    ) -> Result<ContentItem> {
        let mut state = self.state();
        state
            .workflow
            .push((item.id.clone(), state_id.to_string()));
        let stored = state
            .items
            .get_mut(&item.id)
            .ok_or_else(|| Error::NotFound(format!("content item {}", item.id)))?;
        stored.workflow_state = Some(state_id.to_string());
        Ok(stored.clone())
    }
}

/// A call received by [`RecordingTaskApi`]
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TaskCall {
    Download(i64),
    Metadata(i64, Value),
    Confirm(i64),
    Error(i64, String),
    Cancel(i64),
    GetTasks(i64, u32),
}

/// Task API serving canned payloads and recording every call
pub(crate) struct RecordingTaskApi {
    payloads: Mutex<HashMap<i64, String>>,
    tasks: Mutex<Vec<Task>>,
    page_size: usize,
    calls: Mutex<Vec<TaskCall>>,
    failing_downloads: Mutex<HashMap<i64, u16>>,
}

impl RecordingTaskApi {
    pub(crate) fn new() -> Self {
        Self {
            payloads: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            page_size: 2,
            calls: Mutex::new(Vec::new()),
            failing_downloads: Mutex::new(HashMap::new()),
        }
    }

    /// Register a task and its downloadable payload
    pub(crate) fn add_task(&self, task: Task, payload: impl Into<String>) {
        self.payloads
            .lock()
            .unwrap()
            .insert(task.task_id, payload.into());
        self.tasks.lock().unwrap().push(task);
    }

    /// Downloads of `task_id` fail with `status`
    pub(crate) fn fail_download(&self, task_id: i64, status: u16) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert(task_id, status);
    }

    pub(crate) fn calls(&self) -> Vec<TaskCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: TaskCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TaskApi for RecordingTaskApi {
    async fn download_task(&self, task_id: i64) -> Result<String> {
        self.record(TaskCall::Download(task_id));
        if let Some(status) = self.failing_downloads.lock().unwrap().get(&task_id) {
            return Err(Error::Api {
                status: *status,
                message: "download failed".to_string(),
                body: Some(json!({ "status": status, "message": "download failed" })),
            });
        }
        self.payloads
            .lock()
            .unwrap()
            .get(&task_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    async fn update_task_metadata(&self, task_id: i64, metadata: Value) -> Result<()> {
        self.record(TaskCall::Metadata(task_id, metadata));
        Ok(())
    }

    async fn confirm_download(&self, task_id: i64) -> Result<()> {
        self.record(TaskCall::Confirm(task_id));
        Ok(())
    }

    async fn error_task(&self, task_id: i64, message: &str) -> Result<()> {
        self.record(TaskCall::Error(task_id, message.to_string()));
        Ok(())
    }

    async fn cancel_task(&self, task_id: i64) -> Result<()> {
        self.record(TaskCall::Cancel(task_id));
        Ok(())
    }

    async fn get_tasks(&self, submission_id: i64, page: u32) -> Result<TaskPage> {
        self.record(TaskCall::GetTasks(submission_id, page));
        let tasks = self.tasks.lock().unwrap();
        let start = (page.saturating_sub(1) as usize) * self.page_size;
        Ok(TaskPage {
            current_page_number: page,
            total_result_pages_count: tasks.len().div_ceil(self.page_size) as u32,
            total_records_count: tasks.len() as u64,
            tasks_list: tasks
                .iter()
                .skip(start)
                .take(self.page_size)
                .cloned()
                .collect(),
        })
    }
}

/// A task for `source_id` translating into `locale`
pub(crate) fn task(task_id: i64, source_id: &str, locale: &str, status: &str) -> Task {
    Task {
        task_id,
        unique_identifier: source_id.to_string(),
        status: status.to_string(),
        target_locale: Locale::new(locale),
        source_locale: Some(Locale::new("en-GB")),
        name: format!("task {task_id}"),
        submission_id: Some(1),
        content_id: None,
        error_message: None,
        metadata: None,
    }
}
