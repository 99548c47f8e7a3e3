//! Progress-tracked handle to one retrieval
//!
//! A [`RetrievalTask`] is shared between the collector that drives it and any
//! number of observers. Progress is a lock-free counter, the required total is
//! written once after the first page, and the terminal result is written once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, TaskResult};
use crate::types::{TaskId, TaskSnapshot, TaskState};

/// Observable handle to one in-flight or finished retrieval
pub struct RetrievalTask<T> {
    id: TaskId,
    progress: AtomicU64,
    required: OnceLock<u64>,
    outcome: watch::Sender<Option<TaskResult<T>>>,
    cancel_token: CancellationToken,
}

impl<T> std::fmt::Debug for RetrievalTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalTask")
            .field("id", &self.id)
            .field("progress", &self.progress())
            .field("required", &self.required_progress())
            .field("state", &self.state())
            .finish()
    }
}

impl<T> RetrievalTask<T> {
    pub(crate) fn new(id: TaskId) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            id,
            progress: AtomicU64::new(0),
            required: OnceLock::new(),
            outcome,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Task identity, usable with the [`TaskRegistry`](crate::TaskRegistry)
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Records merged so far
    ///
    /// Concurrent page completions may advance the counter right after this
    /// returns.
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    /// Records expected, or None until the first page has been read
    pub fn required_progress(&self) -> Option<u64> {
        self.required.get().copied()
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        match &*self.outcome.borrow() {
            None => TaskState::Running,
            Some(Ok(_)) => TaskState::Completed,
            Some(Err(e)) if matches!(**e, Error::Cancelled) => TaskState::Cancelled,
            Some(Err(_)) => TaskState::Failed,
        }
    }

    /// Progress, total and state in one value
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            current: self.progress(),
            required: self.required_progress(),
            state: self.state(),
        }
    }

    /// Whether the result slot has been written
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// The terminal result, if the task has finished
    pub fn try_result(&self) -> Option<TaskResult<T>> {
        self.outcome.borrow().clone()
    }

    /// Wait for the terminal result
    ///
    /// Every call after resolution returns the same value immediately.
    pub async fn result(&self) -> TaskResult<T> {
        let mut rx = self.outcome.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome
                .clone()
                .unwrap_or_else(|| Err(Arc::new(Error::Other("task resolved empty".into())))),
            // The sender lives in `self`, so this only happens if it was dropped mid-wait
            Err(_) => Err(Arc::new(Error::Other("task dropped before resolving".into()))),
        }
    }

    /// Ask the retrieval to stop
    ///
    /// Pages not yet issued are skipped and the task resolves with
    /// [`Error::Cancelled`]. Has no effect once the task has finished.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Record the total; only the first call has an effect
    pub(crate) fn set_required(&self, total: u64) -> bool {
        self.required.set(total).is_ok()
    }

    /// Add `count` merged records and return the new progress
    ///
    /// Once the total is known progress never moves past it.
    pub(crate) fn advance(&self, count: u64) -> u64 {
        let cap = self.required_progress().unwrap_or(u64::MAX);
        let update = |current: u64| Some(current.saturating_add(count).min(cap).max(current));
        match self
            .progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, update)
        {
            Ok(previous) | Err(previous) => update(previous).unwrap_or(previous),
        }
    }

    /// Write the terminal result; returns false if it was already written
    pub(crate) fn resolve(&self, outcome: TaskResult<T>) -> bool {
        let mut outcome = Some(outcome);
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }
}
