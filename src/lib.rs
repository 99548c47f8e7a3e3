//! # wavy-history
//!
//! Concurrent retrieval of wavy.fm listen histories.
//!
//! ## Design Philosophy
//!
//! wavy-history is designed to be:
//! - **Bounded** - One request gate caps outbound calls across every retrieval
//! - **Exact** - Page counts come from the server total, never guessed
//! - **Observable** - Every retrieval is a task with live progress and events
//! - **Honest** - A retrieval succeeds with every page or fails naming the pages it lost
//!
//! ## Quick Start
//!
//! ```no_run
//! use wavy_history::{Config, Retriever};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let retriever = Retriever::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = retriever.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let user = retriever.retrieve_user("zak").await?;
//!     let task = retriever.retrieve_all_listens(user.id)?;
//!
//!     let listens = task.result().await?;
//!     println!("{} listens", listens.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Gated HTTP client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Task lookup by id
pub mod registry;
/// Admission control for outbound requests
pub mod request_gate;
/// Paginated retrieval
pub mod retrieval;
/// Retry logic with exponential backoff
pub mod retry;
/// Progress-tracked retrieval tasks
pub mod task;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::PageClient;
pub use config::{ApiConfig, Config, GateConfig, RetryConfig};
pub use error::{Error, PageFailure, Result, TaskResult};
pub use registry::TaskRegistry;
pub use request_gate::{GatePermit, RequestGate};
pub use retrieval::{FanOutCollector, ListenHistory, ListenTask, PageSource, Retriever};
pub use task::RetrievalTask;
pub use types::{
    Collection, Event, Keyed, Listen, ListenId, Page, Record, RetrievalRequest, TaskId,
    TaskSnapshot, TaskState, UserKey, WavyUser,
};
