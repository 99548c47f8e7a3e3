//! Process-wide lookup of retrieval tasks by id
//!
//! The registry only observes tasks. It holds weak references, so a task that
//! nobody else holds disappears from it on the next [`TaskRegistry::prune`].
//!
//! Task ids come from one counter shared by every registry in the process, so
//! an id never names two tasks even across retrievers with separate
//! registries. Retrievers that should see each other's tasks share one
//! registry (see [`Retriever::with_shared`](crate::Retriever::with_shared)).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::task::RetrievalTask;
use crate::types::{TaskId, TaskSnapshot};

/// What the registry needs from a task, independent of its result type
pub trait TrackedTask: Send + Sync {
    /// Current progress view
    fn snapshot(&self) -> TaskSnapshot;

    /// Request cancellation
    fn cancel(&self);
}

impl<T: Send + Sync> TrackedTask for RetrievalTask<T> {
    fn snapshot(&self) -> TaskSnapshot {
        RetrievalTask::snapshot(self)
    }

    fn cancel(&self) {
        RetrievalTask::cancel(self)
    }
}

/// Last task id handed out in this process
static LAST_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Registry of retrieval tasks (cloneable - clones share the same entries)
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Weak<dyn TrackedTask>>>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tracked", &self.len())
            .finish()
    }
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a task id unique within the process
    pub fn next_id(&self) -> TaskId {
        TaskId(LAST_TASK_ID.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Start tracking a task
    pub fn register<T>(&self, task: &Arc<RetrievalTask<T>>)
    where
        T: Send + Sync + 'static,
    {
        let task_dyn: Arc<dyn TrackedTask> = task.clone();
        let weak = Arc::downgrade(&task_dyn);
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id(), weak);
        tracing::debug!(task_id = %task.id(), "Registered retrieval task");
    }

    /// Progress of a tracked task that is still alive
    pub fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.upgrade(id).map(|task| task.snapshot())
    }

    /// Request cancellation of a tracked task; false if it is unknown or gone
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.upgrade(id) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshots of every live task, ordered by id
    pub fn active(&self) -> Vec<TaskSnapshot> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshots: Vec<_> = tasks
            .values()
            .filter_map(Weak::upgrade)
            .map(|task| task.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Stop tracking a task; returns whether it was tracked
    pub fn remove(&self, id: TaskId) -> bool {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Drop entries whose task no longer exists; returns how many were dropped
    pub fn prune(&self) -> usize {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|_, task| task.strong_count() > 0);
        before - tasks.len()
    }

    /// Number of entries, including ones whose task is gone but not yet pruned
    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn upgrade(&self, id: TaskId) -> Option<Arc<dyn TrackedTask>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .and_then(Weak::upgrade)
    }
}
