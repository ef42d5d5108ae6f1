//! Typed failures for a harvest run.
//!
//! Only two things can stop a harvest: an input URL we refuse to touch, and a
//! first page we cannot read. Everything else (a single page failing, a date we
//! cannot parse, a missing pagination bar) is recorded as data on the result.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How a single page fetch went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum FetchStatus {
    /// The server answered with a non-2xx status code.
    Http(u16),
    /// The server answered 200 but served the forum's own error page.
    ContentError,
    /// The transport gave up waiting.
    Timeout,
    /// Connection, TLS or body-read failure.
    Transport(String),
}

impl FetchStatus {
    /// The HTTP status code, when there was one.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            FetchStatus::Http(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Http(code) => {
                write!(f, "HTTP {code}")?;
                match code {
                    404 => write!(f, " (page not found)"),
                    403 => write!(f, " (access forbidden)"),
                    503 => write!(f, " (service unavailable)"),
                    _ => Ok(()),
                }
            }
            FetchStatus::ContentError => write!(f, "content-error"),
            FetchStatus::Timeout => write!(f, "timeout"),
            FetchStatus::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// A page could not be retrieved or was an error page in disguise.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("fetching {url} failed: {status}")]
pub struct FetchError {
    pub status: FetchStatus,
    pub url: String,
}

impl FetchError {
    pub fn new(status: FetchStatus, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
        }
    }
}

impl From<(reqwest::Error, &str)> for FetchError {
    fn from((err, url): (reqwest::Error, &str)) -> Self {
        let status = if err.is_timeout() {
            FetchStatus::Timeout
        } else if let Some(code) = err.status() {
            FetchStatus::Http(code.as_u16())
        } else {
            FetchStatus::Transport(err.to_string())
        };
        FetchError::new(status, url)
    }
}

/// Errors that end a harvest with `HarvestStatus::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HarvestError {
    #[error("invalid thread URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl HarvestError {
    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        HarvestError::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
