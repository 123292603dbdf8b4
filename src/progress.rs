//! Progress tracking for concurrently running units of work
//!
//! A [`ProgressList`] is a fixed-size window of progress slots. Each running unit
//! of work claims a slot through [`ProgressList::create_context`] and releases it
//! when its [`ProgressContext`] is freed or dropped. Every mutation publishes a
//! full [`LoadList`] snapshot to subscribers, so observers never see a
//! half-updated record.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Snapshot channel capacity; slow observers skip stale snapshots
const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Fine-grained progress inside the current stage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentProgress {
    /// Numeric progress (caller-defined scale)
    pub num: f64,
    /// Status text
    pub text: String,
}

/// Progress record of one unit of work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadProgress {
    /// Title shown for this unit of work
    pub title: String,
    /// When the unit of work started
    pub start_time: DateTime<Utc>,

    /// Current stage number (0 before the first stage)
    pub stage_number: u32,
    /// Current stage name
    pub stage_name: String,
    /// When the current stage started
    pub stage_start_time: Option<DateTime<Utc>>,
    /// Number of stages
    pub stage_total: u32,

    /// Overall completion (0.0 to 1.0)
    pub total_progress: f64,
    /// Progress inside the current stage
    pub current_progress: CurrentProgress,

    /// Error message, once the unit of work failed
    pub error: Option<String>,
    /// When the error was recorded
    pub error_time: Option<DateTime<Utc>>,

    /// Attempt number while a remote call is being retried
    pub retry_number: Option<u32>,
}

impl LoadProgress {
    /// Create a fresh record with no stage started
    pub fn new(title: impl Into<String>, stage_total: u32) -> Self {
        Self {
            title: title.into(),
            start_time: Utc::now(),
            stage_number: 0,
            stage_name: String::new(),
            stage_start_time: None,
            stage_total,
            total_progress: 0.0,
            current_progress: CurrentProgress::default(),
            error: None,
            error_time: None,
            retry_number: None,
        }
    }
}

/// The full slot array as seen by observers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadList {
    /// Optional title for the whole batch
    pub title: Option<String>,
    /// When the batch started
    pub start_time: DateTime<Utc>,
    /// Slots; `None` means available
    pub progress: Vec<Option<LoadProgress>>,
}

impl LoadList {
    /// Number of occupied slots
    pub fn active_count(&self) -> usize {
        self.progress.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Shared, bounded list of progress slots
///
/// Cloning is cheap; clones share the same slots and subscribers.
#[derive(Clone, Debug)]
pub struct ProgressList {
    state: Arc<Mutex<LoadList>>,
    tx: broadcast::Sender<LoadList>,
}

impl ProgressList {
    /// Allocate `min(total, max_parallelism)` empty slots
    pub fn new(total: usize, max_parallelism: usize, title: Option<String>) -> Self {
        let length = total.min(max_parallelism);
        let (tx, _rx) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(LoadList {
                title,
                start_time: Utc::now(),
                progress: vec![None; length],
            })),
            tx,
        }
    }

    /// Subscribe to snapshots published after every mutation
    pub fn subscribe(&self) -> broadcast::Receiver<LoadList> {
        self.tx.subscribe()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> LoadList {
        self.lock().clone()
    }

    /// Number of slots
    pub fn slot_count(&self) -> usize {
        self.lock().progress.len()
    }

    /// Claim the first free slot for a new unit of work
    ///
    /// Fails with [`Error::ProgressOverflow`] when every slot is taken; callers must
    /// keep at most `max_parallelism` contexts alive.
    pub fn create_context(
        &self,
        title: impl Into<String>,
        stage_total: u32,
    ) -> Result<ProgressContext> {
        let title = title.into();
        let index = self.update(|list| {
            let index = list.progress.iter().position(Option::is_none)?;
            list.progress[index] = Some(LoadProgress::new(title, stage_total));
            Some(index)
        });

        match index {
            Some(index) => Ok(ProgressContext {
                list: self.clone(),
                index,
                released: false,
            }),
            None => Err(Error::ProgressOverflow),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoadList> {
        // A panicking observer cannot leave the list half-written: every update is
        // a single assignment, so the poisoned value is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a mutation and publish the resulting snapshot
    fn update<T>(&self, mutate: impl FnOnce(&mut LoadList) -> T) -> T {
        let (result, snapshot) = {
            let mut list = self.lock();
            let result = mutate(&mut list);
            (result, list.clone())
        };
        // No subscribers is fine
        self.tx.send(snapshot).ok();
        result
    }
}

/// Handle to one claimed slot
///
/// The slot is released by [`ProgressContext::free`] or when the handle is dropped.
#[derive(Debug)]
pub struct ProgressContext {
    list: ProgressList,
    index: usize,
    released: bool,
}

impl ProgressContext {
    /// Slot index inside the list
    pub fn index(&self) -> usize {
        self.index
    }

    /// The list this context belongs to
    pub fn list(&self) -> &ProgressList {
        &self.list
    }

    /// Copy of this context's record
    pub fn snapshot(&self) -> Option<LoadProgress> {
        self.list.lock().progress.get(self.index).cloned().flatten()
    }

    fn with_elem(&self, mutate: impl FnOnce(&mut LoadProgress)) {
        self.list.update(|list| {
            if let Some(Some(elem)) = list.progress.get_mut(self.index) {
                mutate(elem);
            }
        });
    }

    /// Rename the unit of work and reset its stage total
    pub fn set_title(&self, title: impl Into<String>, stage_total: u32) {
        let title = title.into();
        self.with_elem(|elem| {
            elem.title = title;
            elem.stage_total = stage_total;
        });
    }

    /// Enter a new stage
    pub fn set_stage(&self, stage_number: u32, stage_name: impl Into<String>, total_progress: f64) {
        let stage_name = stage_name.into();
        self.with_elem(|elem| {
            elem.stage_number = stage_number;
            elem.stage_name = stage_name;
            elem.stage_start_time = Some(Utc::now());
            elem.total_progress = total_progress;
        });
    }

    /// Set progress inside the current stage
    pub fn set_progress(&self, num: f64, text: impl Into<String>) {
        let text = text.into();
        self.with_elem(|elem| {
            elem.current_progress = CurrentProgress { num, text };
        });
    }

    /// Replace only the status text
    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_elem(|elem| {
            elem.current_progress.text = text;
        });
    }

    /// Record an error, using the structured API message when one is available
    pub fn set_error(&self, error: &Error) {
        let message = error.display_message();
        self.with_elem(|elem| {
            elem.error = Some(message);
            elem.error_time = Some(Utc::now());
        });
    }

    /// Record the attempt number of a retried call (`None` clears it)
    pub fn set_retry(&self, retry: Option<u32>) {
        self.with_elem(|elem| {
            elem.retry_number = retry;
        });
    }

    /// Release the slot
    pub fn free(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let index = self.index;
        self.list.update(|list| {
            if let Some(slot) = list.progress.get_mut(index) {
                *slot = None;
            }
        });
    }
}

impl Drop for ProgressContext {
    fn drop(&mut self) {
        self.release();
    }
}
