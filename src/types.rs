//! Core types for wavy-history

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt::Debug;
use std::hash::Hash;

/// Opaque key identifying a wavy.fm user in the listen-history endpoints
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(pub String);

impl UserKey {
    /// Create a new UserKey
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Unique identifier for a retrieval task within this process
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned identity of one listen
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenId(pub String);

/// Records that carry a server-assigned identity
///
/// Merging pages deduplicates by this key, never by page position.
pub trait Keyed {
    /// Identity type
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// The record's identity
    fn key(&self) -> Self::Key;
}

/// Bounds every record type a retrieval can collect
pub trait Record: Keyed + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Keyed + DeserializeOwned + Send + Sync + 'static {}

/// One listen in a user's history
///
/// Only the id is interpreted. Every other field the server sends is kept
/// as-is in `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listen {
    /// Server-assigned identity
    pub id: ListenId,

    /// Remaining fields of the record, untouched
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Keyed for Listen {
    type Key = ListenId;

    fn key(&self) -> ListenId {
        self.id.clone()
    }
}

/// Public profile of a wavy.fm user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WavyUser {
    /// Key used by the listen-history endpoints
    pub id: UserKey,
    /// Account name
    pub username: String,
    /// Name shown on the profile, if set
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One page of a paginated remote collection
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Records on this page, in server order
    #[serde(rename = "tracks", default = "Vec::new")]
    pub items: Vec<T>,

    /// Total records the server reported when this page was served
    #[serde(rename = "totalTracks")]
    pub total_items: u64,

    /// Zero-based index this page was requested as
    #[serde(skip)]
    pub index: u32,

    /// Page size the request used
    #[serde(skip)]
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Number of pages needed to cover `total_items` at this page size
    pub fn required_pages(&self) -> u32 {
        required_pages(self.total_items, self.page_size)
    }
}

/// `ceil(total / page_size)`, with a single page for an empty collection
///
/// This is the only place the page range is computed; filtered and
/// unfiltered retrievals share it.
pub fn required_pages(total_items: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    let pages = total_items.div_ceil(u64::from(page_size)).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Describes one retrieval of a user's listen history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievalRequest {
    /// Whose history to fetch
    pub user: UserKey,
    /// Only listens at or after this instant (None = whole history)
    pub since: Option<DateTime<Utc>>,
}

impl RetrievalRequest {
    /// Whole listen history of `user`
    pub fn all(user: impl Into<UserKey>) -> Self {
        Self {
            user: user.into(),
            since: None,
        }
    }

    /// Listens of `user` from `since` onwards
    pub fn since(user: impl Into<UserKey>, since: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            since: Some(since),
        }
    }
}

/// The merged result of a retrieval, keyed by record identity
#[derive(Debug)]
pub struct Collection<T: Keyed> {
    items: HashMap<T::Key, T>,
    reported_total: u64,
    pages_fetched: u32,
}

impl<T: Keyed> Collection<T> {
    pub(crate) fn new(items: HashMap<T::Key, T>, reported_total: u64, pages_fetched: u32) -> Self {
        Self {
            items,
            reported_total,
            pages_fetched,
        }
    }

    /// Number of unique records
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no records were retrieved
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up a record by identity
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.items.get(key)
    }

    /// Whether a record with this identity was retrieved
    pub fn contains(&self, key: &T::Key) -> bool {
        self.items.contains_key(key)
    }

    /// Iterate over the records in no particular order
    pub fn iter(&self) -> hash_map::Values<'_, T::Key, T> {
        self.items.values()
    }

    /// Total the server reported on the first page
    pub fn reported_total(&self) -> u64 {
        self.reported_total
    }

    /// Number of pages that were fetched
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Consume the collection, yielding its records
    pub fn into_items(self) -> Vec<T> {
        self.items.into_values().collect()
    }
}

/// Lifecycle state of a retrieval task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Still fetching pages
    Running,
    /// Resolved with the complete result
    Completed,
    /// Resolved with an error
    Failed,
    /// Resolved because it was cancelled
    Cancelled,
}

/// Point-in-time view of a task's progress
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task the snapshot belongs to
    pub id: TaskId,
    /// Records merged so far
    pub current: u64,
    /// Records expected (None until the first page has been read)
    pub required: Option<u64>,
    /// Lifecycle state
    pub state: TaskState,
}

impl TaskSnapshot {
    /// Completion percentage (0.0 to 100.0), None while the total is unknown
    pub fn percent(&self) -> Option<f32> {
        match self.required {
            Some(0) => Some(100.0),
            Some(required) => Some((self.current as f64 / required as f64 * 100.0) as f32),
            None => None,
        }
    }
}

/// Event emitted during a retrieval's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Retrieval task created
    RetrievalStarted {
        /// Task ID
        task: TaskId,
        /// Human-readable description of what is being fetched
        source: String,
    },

    /// First page read; the size of the retrieval is known
    TotalDiscovered {
        /// Task ID
        task: TaskId,
        /// Records reported by the server
        total: u64,
        /// Pages needed to fetch them
        pages: u32,
    },

    /// One page merged
    PageFetched {
        /// Task ID
        task: TaskId,
        /// Zero-based page index
        page: u32,
        /// Records on the page
        items: usize,
        /// Task progress after merging the page
        progress: u64,
    },

    /// Retrieval finished with a complete result
    RetrievalComplete {
        /// Task ID
        task: TaskId,
        /// Unique records retrieved
        items: usize,
    },

    /// Retrieval finished with an error
    RetrievalFailed {
        /// Task ID
        task: TaskId,
        /// Error message
        error: String,
        /// Pages that failed, if the failure happened during fan-out
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_pages: Vec<u32>,
    },

    /// Retrieval was cancelled
    RetrievalCancelled {
        /// Task ID
        task: TaskId,
    },
}
