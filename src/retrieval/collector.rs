//! Paginated fan-out retrieval.
//!
//! Phases of one run:
//! 1. Fetch page 0 on its own; only its response says how big the resource is
//! 2. Record the total on the task and merge page 0
//! 3. Spawn one child per remaining page, each gated by the request gate
//! 4. Wait on the join barrier for every child
//! 5. Resolve the task with the merged collection, or with an error

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::client::PageClient;
use crate::config::RetryConfig;
use crate::error::{Error, PageFailure, Result};
use crate::registry::TaskRegistry;
use crate::retry::fetch_with_retry;
use crate::task::RetrievalTask;
use crate::types::{Collection, Event, Keyed, Page, Record};

use super::source::PageSource;

/// Records merged so far by one retrieval, keyed by identity.
pub(crate) struct MergedSet<T: Keyed> {
    items: Mutex<HashMap<T::Key, T>>,
}

impl<T: Keyed> MergedSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Insert records not seen before; returns how many were new.
    pub(crate) async fn merge(&self, records: Vec<T>) -> u64 {
        let mut items = self.items.lock().await;
        let mut added = 0;
        for record in records {
            if let Entry::Vacant(slot) = items.entry(record.key()) {
                slot.insert(record);
                added += 1;
            }
        }
        added
    }

    pub(crate) async fn take(&self) -> HashMap<T::Key, T> {
        std::mem::take(&mut *self.items.lock().await)
    }
}

/// Drives paginated retrievals and tracks them as [`RetrievalTask`]s
pub struct FanOutCollector {
    client: PageClient,
    registry: TaskRegistry,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
}

/// Shared state for one run, cloned into every page child.
struct RunContext<T: Keyed, S> {
    client: PageClient,
    source: Arc<S>,
    task: Arc<RetrievalTask<Collection<T>>>,
    merged: Arc<MergedSet<T>>,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
}

impl<T: Keyed, S> Clone for RunContext<T, S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            source: Arc::clone(&self.source),
            task: Arc::clone(&self.task),
            merged: Arc::clone(&self.merged),
            retry: self.retry.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

impl FanOutCollector {
    /// Create a collector issuing requests through `client`
    pub fn new(
        client: PageClient,
        registry: TaskRegistry,
        retry: RetryConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            registry,
            retry,
            event_tx,
        }
    }

    /// Start retrieving every page of `source` in the background
    ///
    /// The task is registered before this returns. Must be called from within
    /// a tokio runtime.
    pub fn start<T, S>(&self, source: S) -> Arc<RetrievalTask<Collection<T>>>
    where
        T: Record,
        S: PageSource,
    {
        let task = Arc::new(RetrievalTask::new(self.registry.next_id()));
        self.registry.register(&task);

        let description = source.describe();
        tracing::info!(task_id = %task.id(), source = %description, "Starting retrieval");
        self.event_tx
            .send(Event::RetrievalStarted {
                task: task.id(),
                source: description,
            })
            .ok();

        let ctx = RunContext {
            client: self.client.clone(),
            source: Arc::new(source),
            task: Arc::clone(&task),
            merged: Arc::new(MergedSet::new()),
            retry: self.retry.clone(),
            event_tx: self.event_tx.clone(),
        };
        tokio::spawn(run(ctx));

        task
    }
}

async fn run<T, S>(ctx: RunContext<T, S>)
where
    T: Record,
    S: PageSource,
{
    let id = ctx.task.id();

    // Collect in its own task so a panic still resolves the retrieval
    let worker = ctx.clone();
    let outcome = match tokio::spawn(async move { collect(&worker).await }).await {
        Ok(outcome) => outcome,
        Err(join_error) => Err(Error::Other(format!("retrieval task failed: {}", join_error))),
    };

    match &outcome {
        Ok(collection) => {
            tracing::info!(
                task_id = %id,
                items = collection.len(),
                pages = collection.pages_fetched(),
                "Retrieval complete"
            );
            ctx.event_tx
                .send(Event::RetrievalComplete {
                    task: id,
                    items: collection.len(),
                })
                .ok();
        }
        Err(Error::Cancelled) => {
            tracing::info!(task_id = %id, progress = ctx.task.progress(), "Retrieval cancelled");
            ctx.event_tx.send(Event::RetrievalCancelled { task: id }).ok();
        }
        Err(e) => {
            tracing::error!(task_id = %id, error = %e, "Retrieval failed");
            ctx.event_tx
                .send(Event::RetrievalFailed {
                    task: id,
                    error: e.to_string(),
                    failed_pages: e.failed_pages(),
                })
                .ok();
        }
    }

    ctx.task.resolve(outcome.map(Arc::new).map_err(Arc::new));
}

async fn collect<T, S>(ctx: &RunContext<T, S>) -> Result<Collection<T>>
where
    T: Record,
    S: PageSource,
{
    let id = ctx.task.id();

    if ctx.task.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Page 0 alone: its total decides how wide the fan-out is
    let first: Page<T> = fetch_page(ctx, 0).await?;
    let total = first.total_items;
    let pages = first.required_pages();
    let max_pages = ctx.client.max_pages();
    if pages > max_pages {
        return Err(Error::TotalTooLarge {
            total,
            pages,
            max_pages,
        });
    }

    ctx.task.set_required(total);
    tracing::debug!(task_id = %id, total, pages, "Discovered retrieval size");
    ctx.event_tx
        .send(Event::TotalDiscovered {
            task: id,
            total,
            pages,
        })
        .ok();
    record_page(ctx, first).await;

    if pages > 1 {
        fan_out(ctx, pages).await?;
    }

    Ok(Collection::new(ctx.merged.take().await, total, pages))
}

/// Fetch pages `1..pages` concurrently and wait for all of them.
async fn fan_out<T, S>(ctx: &RunContext<T, S>, pages: u32) -> Result<()>
where
    T: Record,
    S: PageSource,
{
    let mut fetches = JoinSet::new();
    for page in 1..pages {
        let ctx = ctx.clone();
        fetches.spawn(async move {
            if ctx.task.is_cancelled() {
                return Err(PageFailure {
                    page,
                    error: Error::Cancelled,
                });
            }
            let fetched = fetch_page(&ctx, page)
                .await
                .map_err(|error| PageFailure { page, error })?;
            record_page(&ctx, fetched).await;
            Ok(())
        });
    }

    let cancel = ctx.task.cancel_token().clone();
    let mut failures = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                fetches.abort_all();
                return Err(Error::Cancelled);
            }
            joined = fetches.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(failure))) => {
                    tracing::warn!(
                        task_id = %ctx.task.id(),
                        page = failure.page,
                        error = %failure.error,
                        "Page fetch failed"
                    );
                    failures.push(failure);
                }
                Some(Err(join_error)) => {
                    fetches.abort_all();
                    return Err(Error::Other(format!("page fetch task failed: {}", join_error)));
                }
            },
        }
    }

    if failures.is_empty() {
        return Ok(());
    }
    failures.sort_by_key(|f| f.page);
    Err(Error::PartialFanOut {
        failures,
        total_pages: pages,
    })
}

async fn fetch_page<T, S>(ctx: &RunContext<T, S>, page: u32) -> Result<Page<T>>
where
    T: Record,
    S: PageSource,
{
    let span = tracing::debug_span!("page_fetch", task_id = %ctx.task.id(), page);
    fetch_with_retry(&ctx.retry, || ctx.client.fetch_page(&*ctx.source, page))
        .instrument(span)
        .await
}

/// Merge a page and move progress forward by the records it added.
async fn record_page<T, S>(ctx: &RunContext<T, S>, page: Page<T>)
where
    T: Record,
{
    let index = page.index;
    let items = page.items.len();
    let added = ctx.merged.merge(page.items).await;
    let progress = ctx.task.advance(added);

    tracing::debug!(task_id = %ctx.task.id(), page = index, items, added, progress, "Merged page");
    ctx.event_tx
        .send(Event::PageFetched {
            task: ctx.task.id(),
            page: index,
            items,
            progress,
        })
        .ok();
}
