//! Error types for wavy-history
//!
//! Every failure a retrieval can hit is an explicit variant here. A failed
//! page is never turned into an empty page: it either fails the retrieval
//! directly (page 0) or is reported through [`Error::PartialFanOut`].

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for wavy-history operations
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal value of a retrieval task.
///
/// Both sides are reference counted so every observer of a task receives the
/// same resolved value.
pub type TaskResult<T> = std::result::Result<Arc<T>, Arc<Error>>;

/// Main error type for wavy-history
#[derive(Debug, Error)]
pub enum Error {
    /// Network or I/O failure while performing one outbound call
    #[error("transport failure requesting {url}: {source}")]
    Transport {
        /// The URL that was being requested
        url: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// The remote server answered with a non-success status
    #[error("unexpected HTTP {status} from {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// The response body could not be decoded into the expected shape
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// The URL whose body failed to decode
        url: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// No request permit could be obtained from the request gate
    #[error("could not acquire a request permit within {waited:?}")]
    PermitAcquisition {
        /// How long the caller waited before giving up
        waited: Duration,
    },

    /// One or more pages after the first failed
    #[error(
        "{} of {total_pages} pages failed: {}",
        .failures.len(),
        describe_failures(.failures)
    )]
    PartialFanOut {
        /// Every failed page, ordered by page index
        failures: Vec<PageFailure>,
        /// Number of pages the retrieval needed
        total_pages: u32,
    },

    /// The first page reported a total needing more pages than allowed
    #[error("reported total of {total} items needs {pages} pages, limit is {max_pages}")]
    TotalTooLarge {
        /// Total the server reported
        total: u64,
        /// Pages that total would need
        pages: u32,
        /// Configured page limit
        max_pages: u32,
    },

    /// The retrieval was cancelled before it completed
    #[error("retrieval cancelled")]
    Cancelled,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.page_size")
        key: Option<String>,
    },

    /// A URL could not be built from the configured base and parameters
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// No task with this id is being tracked
    #[error("task {0} not found")]
    TaskNotFound(u64),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// A single page that failed during fan-out, with the reason it failed
#[derive(Debug)]
pub struct PageFailure {
    /// Zero-based page index
    pub page: u32,
    /// Why the page could not be retrieved
    pub error: Error,
}

impl std::fmt::Display for PageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page {}: {}", self.page, self.error)
    }
}

fn describe_failures(failures: &[PageFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Transport { .. } => "transport_failure",
            Error::HttpStatus { .. } => "http_status",
            Error::Decode { .. } => "decode_failure",
            Error::PermitAcquisition { .. } => "permit_acquisition_failure",
            Error::PartialFanOut { .. } => "partial_fan_out_failure",
            Error::TotalTooLarge { .. } => "total_too_large",
            Error::Cancelled => "cancelled",
            Error::Config { .. } => "config_error",
            Error::InvalidUrl(_) => "invalid_url",
            Error::TaskNotFound(_) => "task_not_found",
            Error::Other(_) => "internal_error",
        }
    }

    /// Page indices that failed, if this is a fan-out failure
    pub fn failed_pages(&self) -> Vec<u32> {
        match self {
            Error::PartialFanOut { failures, .. } => failures.iter().map(|f| f.page).collect(),
            _ => Vec::new(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn decode_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{not json").unwrap_err()
    }

    #[test]
    fn every_variant_has_a_distinct_code() {
        let errors = vec![
            Error::HttpStatus {
                url: "http://x".into(),
                status: 500,
            },
            Error::Decode {
                url: "http://x".into(),
                source: decode_error(),
            },
            Error::PermitAcquisition {
                waited: Duration::from_secs(1),
            },
            Error::PartialFanOut {
                failures: vec![],
                total_pages: 3,
            },
            Error::TotalTooLarge {
                total: 1_000_000_000_000,
                pages: u32::MAX,
                max_pages: 10_000,
            },
            Error::Cancelled,
            Error::Config {
                message: "bad".into(),
                key: None,
            },
            Error::InvalidUrl("nope".into()),
            Error::TaskNotFound(7),
            Error::Other("misc".into()),
        ];

        let mut codes: Vec<_> = errors.iter().map(Error::error_code).collect();
        let before = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), before, "error codes must be unique");
    }

    #[test]
    fn partial_fan_out_names_every_failed_page() {
        let err = Error::PartialFanOut {
            failures: vec![
                PageFailure {
                    page: 1,
                    error: Error::HttpStatus {
                        url: "http://wavy.test/listens?page=1".into(),
                        status: 502,
                    },
                },
                PageFailure {
                    page: 4,
                    error: Error::Cancelled,
                },
            ],
            total_pages: 5,
        };

        let message = err.to_string();
        assert!(message.starts_with("2 of 5 pages failed"), "{message}");
        assert!(message.contains("page 1: unexpected HTTP 502"), "{message}");
        assert!(message.contains("page 4: retrieval cancelled"), "{message}");
        assert_eq!(err.failed_pages(), vec![1, 4]);
    }

    #[test]
    fn failed_pages_is_empty_for_other_variants() {
        assert!(Error::Cancelled.failed_pages().is_empty());
        assert!(
            Error::Decode {
                url: "http://x".into(),
                source: decode_error(),
            }
            .failed_pages()
            .is_empty()
        );
    }

    #[test]
    fn decode_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Decode {
            url: "http://wavy.test/profiles".into(),
            source: decode_error(),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("http://wavy.test/profiles"));
    }
}
