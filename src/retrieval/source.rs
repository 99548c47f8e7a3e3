//! URL strategies for paginated resources.

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{Error, Result};
use crate::types::{RetrievalRequest, UserKey};

/// Builds the URL of one page of a paginated resource
///
/// This is the only thing that differs between retrievals; page counting,
/// fan-out and merging are shared.
pub trait PageSource: Send + Sync + 'static {
    /// URL of page `page` (zero-based) at `page_size` items per page
    fn page_url(&self, page: u32, page_size: u32) -> Result<Url>;

    /// Short description used in logs and events
    fn describe(&self) -> String;
}

/// A user's listen history, optionally restricted to listens since an instant
#[derive(Clone, Debug)]
pub struct ListenHistory {
    base_url: Url,
    user: UserKey,
    since: Option<DateTime<Utc>>,
}

impl ListenHistory {
    /// History source for `request` under the API rooted at `base_url`
    pub fn new(base_url: &Url, request: &RetrievalRequest) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url: base_url.clone(),
            user: request.user.clone(),
            since: request.since,
        })
    }

    /// Whose history this is
    pub fn user(&self) -> &UserKey {
        &self.user
    }

    /// Lower bound of the history, if filtered
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }
}

impl PageSource for ListenHistory {
    fn page_url(&self, page: u32, page_size: u32) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["profile", "listens", self.user.as_str()]);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("live", "false")
                .append_pair("page", &page.to_string());
            if let Some(since) = self.since {
                query.append_pair("since", &since.timestamp_millis().to_string());
            }
            query.append_pair("size", &page_size.to_string());
        }

        Ok(url)
    }

    fn describe(&self) -> String {
        match self.since {
            Some(since) => format!("listens of {} since {}", self.user, since.to_rfc3339()),
            None => format!("all listens of {}", self.user),
        }
    }
}
