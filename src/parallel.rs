//! Bounded-concurrency processing of a work queue
//!
//! [`parallel_process`] runs a fixed number of lanes on the calling task. Each lane
//! repeatedly takes the next item from the front of a shared queue and awaits the
//! action for it. The first failure stops further dispatch; actions that are
//! already running are allowed to finish before the error is returned.

use futures::future::join_all;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared scheduling state for one [`parallel_process`] call
struct Dispatcher<T, E> {
    queue: Mutex<VecDeque<T>>,
    next_index: AtomicUsize,
    stopped: AtomicBool,
    first_error: Mutex<Option<E>>,
}

impl<T, E> Dispatcher<T, E> {
    /// Pop the next item and assign its dispatch index, unless dispatch has stopped
    fn next(&self) -> Option<(T, usize)> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        let item = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()?;
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        Some((item, index))
    }

    fn fail(&self, error: E) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut slot = self.first_error.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(error);
        }
    }
}

/// Process `items` with at most `max_parallelism` actions in flight
///
/// `action` receives each item together with its dispatch index, a strictly
/// increasing number assigned when the item is taken from the queue. Returns the
/// first error once every dispatched action has completed. An empty input or a
/// parallelism of zero returns immediately without running anything.
pub async fn parallel_process<T, E, F, Fut>(
    items: Vec<T>,
    max_parallelism: usize,
    action: F,
) -> Result<(), E>
where
    F: Fn(T, usize) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let parallelism = items.len().min(max_parallelism);
    if parallelism == 0 {
        return Ok(());
    }

    let dispatcher = Dispatcher {
        queue: Mutex::new(items.into()),
        next_index: AtomicUsize::new(0),
        stopped: AtomicBool::new(false),
        first_error: Mutex::new(None),
    };

    let shared = &dispatcher;
    let action = &action;
    let lanes = (0..parallelism).map(move |lane| {
        let dispatcher = shared;
        async move {
            while let Some((item, index)) = dispatcher.next() {
                tracing::trace!(lane, index, "Dispatching item");
                if let Err(e) = action(item, index).await {
                    tracing::debug!(lane, index, "Action failed, stopping dispatch");
                    dispatcher.fail(e);
                    break;
                }
            }
        }
    });
    join_all(lanes).await;

    match dispatcher
        .first_error
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
    {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
