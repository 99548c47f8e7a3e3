//! Single-call HTTP client for the wavy.fm API
//!
//! Every method performs exactly one outbound request: take a permit from the
//! [`RequestGate`], send, read the body, give the permit back, then decode.
//! Failures are returned as typed errors; there is no retry at this level.

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::request_gate::{GatePermit, RequestGate};
use crate::retrieval::source::PageSource;
use crate::types::{Page, WavyUser};

/// Gated HTTP client (cloneable - clones share the connection pool and gate)
#[derive(Clone, Debug)]
pub struct PageClient {
    http: reqwest::Client,
    gate: RequestGate,
    base_url: Url,
    page_size: u32,
    max_pages: u32,
    acquire_timeout: Option<Duration>,
}

impl PageClient {
    /// Build a client from configuration, sharing `gate` with other clients
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the HTTP client cannot
    /// be created
    pub fn new(config: &Config, gate: RequestGate) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.api.request_timeout)
            .user_agent(config.api.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.api.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL: {}", e),
            key: Some("api.base_url".to_string()),
        })?;

        Ok(Self {
            http,
            gate,
            base_url,
            page_size: config.api.page_size,
            max_pages: config.api.max_pages,
            acquire_timeout: config.gate.acquire_timeout,
        })
    }

    /// The gate this client draws permits from
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// Configured base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Items requested per page
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Most pages a single retrieval may need
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Fetch one page of `source`
    ///
    /// The returned page carries the index and page size it was requested with.
    pub async fn fetch_page<T, S>(&self, source: &S, page: u32) -> Result<Page<T>>
    where
        T: DeserializeOwned,
        S: PageSource + ?Sized,
    {
        let url = source.page_url(page, self.page_size)?;
        let mut decoded: Page<T> = self.fetch_json(url).await?;
        decoded.index = page;
        decoded.page_size = self.page_size;
        Ok(decoded)
    }

    /// Fetch a user's public profile by account name
    pub async fn fetch_user(&self, username: &str) -> Result<WavyUser> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("profiles");
        url.query_pairs_mut().append_pair("username", username);
        self.fetch_json(url).await
    }

    /// Perform one gated GET and decode the JSON body
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = {
            let _permit = self.permit().await?;
            self.send(&url).await?
        };

        serde_json::from_str(&body).map_err(|source| Error::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn permit(&self) -> Result<GatePermit> {
        match self.acquire_timeout {
            Some(timeout) => self.gate.acquire_timeout(timeout).await,
            None => self.gate.acquire().await,
        }
    }

    async fn send(&self, url: &Url) -> Result<String> {
        tracing::trace!(url = %url, "GET");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| Error::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| Error::Transport {
            url: url.to_string(),
            source,
        })
    }
}
