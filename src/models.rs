//! Data models for harvested threads.
//!
//! This module defines the values a harvest produces:
//! - [`Message`]: one extracted discussion post
//! - [`PageResult`]: the outcome of fetching and extracting one page
//! - [`HarvestResult`]: the finished, ordered corpus for a whole thread
//!
//! Field names serialize in camelCase so the JSON output matches what
//! downstream consumers of the corpus expect (`postedAt`, `pageErrors`, ...).

use crate::error::{FetchError, FetchStatus, HarvestError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author used when a post carries no username element.
pub const UNKNOWN_USER: &str = "Unknown User";
/// Timestamp used when a post carries no time element.
pub const UNKNOWN_DATE: &str = "Unknown date";

/// A single discussion post extracted from a thread page.
///
/// `posted_at` is ISO-8601 UTC whenever the source date could be understood,
/// otherwise the raw string exactly as it appeared in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub author: String,
    pub posted_at: String,
    pub body: String,
}

/// Why a single page contributed no messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub page_number: u32,
    pub url: String,
    pub status: FetchStatus,
    pub message: String,
}

impl ErrorInfo {
    pub fn from_fetch(page_number: u32, err: &FetchError) -> Self {
        Self {
            page_number,
            url: err.url.clone(),
            status: err.status.clone(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one page fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub page_number: u32,
    pub messages: Vec<Message>,
    pub error: Option<ErrorInfo>,
}

impl PageResult {
    pub fn succeeded(page_number: u32, messages: Vec<Message>) -> Self {
        Self {
            page_number,
            messages,
            error: None,
        }
    }

    pub fn failed(page_number: u32, err: &FetchError) -> Self {
        Self {
            page_number,
            messages: Vec::new(),
            error: Some(ErrorInfo::from_fetch(page_number, err)),
        }
    }
}

/// Stages of a harvest run, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Validating,
    FetchingFirstPage,
    Planning,
    FetchingRemaining,
    Aggregating,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Stage::Validating => "validating",
            Stage::FetchingFirstPage => "fetching-first-page",
            Stage::Planning => "planning",
            Stage::FetchingRemaining => "fetching-remaining",
            Stage::Aggregating => "aggregating",
            Stage::Done => "done",
        };
        f.write_str(tag)
    }
}

/// Terminal status of a harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HarvestStatus {
    Success,
    PartialSuccess,
    EmptyThread,
    Failed,
}

/// Where and why a harvest failed outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestFailure {
    pub stage: Stage,
    pub error: HarvestError,
}

/// The finished corpus of one thread.
///
/// Messages are in page order, then document order within a page. They are
/// never re-sorted by timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestResult {
    pub thread_url: String,
    pub total_pages_discovered: u32,
    pub messages: Vec<Message>,
    pub page_errors: Vec<ErrorInfo>,
    pub status: HarvestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<HarvestFailure>,
}

impl HarvestResult {
    pub(crate) fn failed(thread_url: String, stage: Stage, error: HarvestError) -> Self {
        Self {
            thread_url,
            total_pages_discovered: 0,
            messages: Vec::new(),
            page_errors: Vec::new(),
            status: HarvestStatus::Failed,
            failure: Some(HarvestFailure { stage, error }),
        }
    }

    pub(crate) fn empty(thread_url: String, total_pages_discovered: u32) -> Self {
        Self {
            thread_url,
            total_pages_discovered,
            messages: Vec::new(),
            page_errors: Vec::new(),
            status: HarvestStatus::EmptyThread,
            failure: None,
        }
    }

    /// Assemble the result from page outcomes, which must already be in
    /// ascending page order.
    pub(crate) fn from_pages(
        thread_url: String,
        total_pages_discovered: u32,
        pages: Vec<PageResult>,
    ) -> Self {
        let (messages, page_errors) = pages.into_iter().fold(
            (Vec::<Message>::new(), Vec::<ErrorInfo>::new()),
            |(mut messages, mut errors), page| {
                messages.extend(page.messages);
                errors.extend(page.error);
                (messages, errors)
            },
        );

        let status = match (messages.is_empty(), page_errors.is_empty()) {
            (false, true) => HarvestStatus::Success,
            (true, true) => HarvestStatus::EmptyThread,
            // Page 1 was readable, so a thread whose other pages all failed
            // is partial, never failed.
            (_, false) => HarvestStatus::PartialSuccess,
        };

        Self {
            thread_url,
            total_pages_discovered,
            messages,
            page_errors,
            status,
            failure: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == HarvestStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(author: &str, body: &str) -> Message {
        Message {
            author: author.to_string(),
            posted_at: "2024-01-01T00:00:00Z".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn from_pages_concatenates_in_given_order() {
        let pages = vec![
            PageResult::succeeded(1, vec![msg("a", "1"), msg("b", "2")]),
            PageResult::succeeded(2, vec![msg("c", "3")]),
        ];
        let result = HarvestResult::from_pages("https://t/".into(), 2, pages);
        let bodies: Vec<_> = result.messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["1", "2", "3"]);
        assert_eq!(result.status, HarvestStatus::Success);
    }

    #[test]
    fn from_pages_with_error_and_messages_is_partial() {
        let err = FetchError::new(FetchStatus::Http(503), "https://t/page-2/");
        let pages = vec![
            PageResult::succeeded(1, vec![msg("a", "1")]),
            PageResult::failed(2, &err),
        ];
        let result = HarvestResult::from_pages("https://t/".into(), 2, pages);
        assert_eq!(result.status, HarvestStatus::PartialSuccess);
        assert_eq!(result.page_errors.len(), 1);
        assert_eq!(result.page_errors[0].page_number, 2);
        assert_eq!(result.page_errors[0].status.http_code(), Some(503));
    }

    #[test]
    fn from_pages_without_messages_or_errors_is_empty() {
        let pages = vec![PageResult::succeeded(1, vec![]), PageResult::succeeded(2, vec![])];
        let result = HarvestResult::from_pages("https://t/".into(), 2, pages);
        assert_eq!(result.status, HarvestStatus::EmptyThread);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let result = HarvestResult::from_pages(
            "https://t/".into(),
            1,
            vec![PageResult::succeeded(1, vec![msg("a", "hi")])],
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["threadUrl"], "https://t/");
        assert_eq!(json["totalPagesDiscovered"], 1);
        assert_eq!(json["messages"][0]["postedAt"], "2024-01-01T00:00:00Z");
        assert_eq!(json["status"], "success");
        assert!(json.get("failure").is_none());
    }
}
