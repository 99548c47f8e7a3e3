//! Listen-history retrieval
//!
//! [`Retriever`] wires configuration, the request gate, the HTTP client, the
//! task registry and the event channel together. Each retrieval runs in the
//! background as a [`RetrievalTask`] that callers can poll, await or cancel.
//!
//! - [`source`] - URL strategies for paginated resources
//! - `collector` - page 0 first, then the remaining pages concurrently

mod collector;
pub mod source;


pub use collector::FanOutCollector;
pub use source::{ListenHistory, PageSource};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::client::PageClient;
use crate::config::Config;
use crate::error::{Error, Result, TaskResult};
use crate::registry::TaskRegistry;
use crate::request_gate::RequestGate;
use crate::task::RetrievalTask;
use crate::types::{
    Collection, Event, Listen, RetrievalRequest, TaskId, TaskSnapshot, UserKey, WavyUser,
};

/// Handle to a retrieval of listen history
pub type ListenTask = RetrievalTask<Collection<Listen>>;

/// Entry point for retrieving wavy.fm listen histories
///
/// Cloning is cheap; clones share the gate, registry and event channel.
#[derive(Clone)]
pub struct Retriever {
    config: Arc<Config>,
    client: PageClient,
    registry: TaskRegistry,
    collector: Arc<FanOutCollector>,
    event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("base_url", &self.client.base_url().as_str())
            .field("gate", self.client.gate())
            .field("registry", &self.registry)
            .finish()
    }
}

impl Retriever {
    /// Create a retriever with its own request gate sized from `config`
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        let gate = RequestGate::new(config.gate.max_outstanding_requests);
        Self::with_gate(config, gate)
    }

    /// Create a retriever drawing permits from an existing gate
    ///
    /// Retrievers sharing a gate share its capacity, so the bound on
    /// outstanding requests holds across all of them.
    pub fn with_gate(config: Config, gate: RequestGate) -> Result<Self> {
        Self::with_shared(config, gate, TaskRegistry::new())
    }

    /// Create a retriever sharing both a gate and a task registry
    ///
    /// Retrievers built on the same registry can look up, observe and cancel
    /// each other's tasks by id.
    pub fn with_shared(config: Config, gate: RequestGate, registry: TaskRegistry) -> Result<Self> {
        let client = PageClient::new(&config, gate)?;
        let (event_tx, _rx) = broadcast::channel(config.event_buffer);
        let collector = FanOutCollector::new(
            client.clone(),
            registry.clone(),
            config.retry.clone(),
            event_tx.clone(),
        );

        tracing::debug!(
            base_url = %client.base_url(),
            page_size = client.page_size(),
            capacity = client.gate().capacity(),
            "Retriever ready"
        );

        Ok(Self {
            config: Arc::new(config),
            client,
            registry,
            collector: Arc::new(collector),
            event_tx,
        })
    }

    /// Start a retrieval in the background
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns [`Error::InvalidUrl`] if the configured base URL cannot carry a
    /// path
    pub fn start_retrieval(&self, request: RetrievalRequest) -> Result<Arc<ListenTask>> {
        let source = ListenHistory::new(self.client.base_url(), &request)?;
        Ok(self.collector.start(source))
    }

    /// Start retrieving a user's whole listen history
    pub fn retrieve_all_listens(&self, user: impl Into<UserKey>) -> Result<Arc<ListenTask>> {
        self.start_retrieval(RetrievalRequest::all(user))
    }

    /// Start retrieving a user's listens at or after `since`
    pub fn retrieve_listens_since(
        &self,
        user: impl Into<UserKey>,
        since: DateTime<Utc>,
    ) -> Result<Arc<ListenTask>> {
        self.start_retrieval(RetrievalRequest::since(user, since))
    }

    /// Progress of a live task tracked by this retriever's registry
    pub fn progress(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.registry.snapshot(id)
    }

    /// Wait for a task's terminal result
    pub async fn await_result(&self, task: &ListenTask) -> TaskResult<Collection<Listen>> {
        task.result().await
    }

    /// Request cancellation of a task by id
    ///
    /// # Errors
    /// Returns [`Error::TaskNotFound`] if no live task has this id
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        if self.registry.cancel(id) {
            tracing::info!(task_id = %id, "Cancellation requested");
            Ok(())
        } else {
            Err(Error::TaskNotFound(id.get()))
        }
    }

    /// Look up a user's profile by account name
    pub async fn retrieve_user(&self, username: &str) -> Result<WavyUser> {
        self.client.fetch_user(username).await
    }

    /// Subscribe to retrieval events
    ///
    /// Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Registry this retriever tracks its tasks in
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// The request gate shared by every retrieval
    pub fn gate(&self) -> &RequestGate {
        self.client.gate()
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }
}
