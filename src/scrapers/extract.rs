//! Message and pagination extraction from XenForo thread pages.
//!
//! Every post is an `article.message`. Inside it the username, a `time.u-dt`
//! element and the `.bbWrapper` body are all we need. Pagination lives in
//! `.pageNav-main` (full nav) or `.pageNavSimple` (the compact mobile nav).
//!
//! Extraction never fails: a missing author becomes [`UNKNOWN_USER`], a date
//! we cannot read is kept verbatim, and a page without a pagination bar is a
//! single-page thread.

use crate::models::{Message, UNKNOWN_DATE, UNKNOWN_USER};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article.message"));
static AUTHOR: Lazy<Selector> = Lazy::new(|| selector(".message-user .username"));
static AUTHOR_FALLBACK: Lazy<Selector> = Lazy::new(|| selector(".message-name .username"));
static TIME: Lazy<Selector> = Lazy::new(|| selector("time.u-dt"));
static CONTENT: Lazy<Selector> = Lazy::new(|| selector(".message-content .bbWrapper"));
static CONTENT_FALLBACK: Lazy<Selector> = Lazy::new(|| selector(".bbWrapper"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static ERROR_BLOCK: Lazy<Selector> = Lazy::new(|| selector(".blockMessage--error"));
static PAGE_NAV: Lazy<Selector> = Lazy::new(|| selector(".pageNav-main, .pageNavSimple"));
static PAGE_LINK: Lazy<Selector> = Lazy::new(|| selector("li.pageNav-page a"));
static PAGE_CURRENT: Lazy<Selector> =
    Lazy::new(|| selector(".pageNav-page--current, .pageNavSimple-el--current"));

/// Title of the page XenForo serves (with status 200) for private, deleted or
/// otherwise inaccessible threads.
const ERROR_PAGE_TITLE: &str = "Oops! We ran into some problems.";

/// Already carries a zone: a time of day followed by `Z`, `UTC`, `GMT` or a
/// numeric offset.
static HAS_ZONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?\s*(?:z|utc|gmt|[+-]\d{2}:?\d{2})$").unwrap()
});
static BARE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static OF_TOTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bof\s+(\d+)").unwrap());

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%b %d, %Y at %I:%M %p",
    "%B %d, %Y at %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%d %b %Y %H:%M",
    "%d %B %Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y", "%Y/%m/%d", "%m/%d/%Y"];

/// One parsed thread page.
pub struct ParsedPage {
    document: Html,
}

impl ParsedPage {
    /// Parse a response body. Malformed markup is repaired the way a browser
    /// would, so this never fails.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let page = ParsedPage::parse("<html><head><title>Thread</title></head></html>");
    /// assert_eq!(page.title().as_deref(), Some("Thread"));
    /// ```
    pub fn parse(body: &str) -> Self {
        Self {
            document: Html::parse_document(body),
        }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    /// The trimmed `<title>` text, if the page has one.
    pub fn title(&self) -> Option<String> {
        self.document
            .select(&TITLE)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
    }

    /// Whether this is the forum's own error page rather than a thread.
    pub fn is_site_error(&self) -> bool {
        let bad_title = self
            .title()
            .is_some_and(|title| title.contains(ERROR_PAGE_TITLE));
        bad_title || self.document.select(&ERROR_BLOCK).next().is_some()
    }
}

/// All non-empty posts on the page, in document order.
pub fn extract_messages(page: &ParsedPage) -> Vec<Message> {
    let mut messages = Vec::new();
    for article in page.document().select(&ARTICLE) {
        let body = article
            .select(&CONTENT)
            .next()
            .or_else(|| article.select(&CONTENT_FALLBACK).next())
            .map(body_text)
            .unwrap_or_default();
        if body.is_empty() {
            debug!("Skipping post with empty body");
            continue;
        }

        let author = article
            .select(&AUTHOR)
            .next()
            .or_else(|| article.select(&AUTHOR_FALLBACK).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        let raw_date = article
            .select(&TIME)
            .next()
            .and_then(|el| {
                el.value()
                    .attr("datetime")
                    .map(str::to_string)
                    .or_else(|| Some(el.text().collect::<String>()))
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string());

        messages.push(Message {
            author,
            posted_at: normalize_timestamp(&raw_date),
            body,
        });
    }
    messages
}

/// Flatten a post body: text children verbatim, `<br>` as a newline, any
/// other element as its text content.
fn body_text(content: ElementRef<'_>) -> String {
    let mut body = String::new();
    for child in content.children() {
        match child.value() {
            Node::Text(text) => body.push_str(text),
            Node::Element(el) if el.name().eq_ignore_ascii_case("br") => body.push('\n'),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    body.extend(el.text());
                }
            }
            _ => {}
        }
    }
    body.trim().to_string()
}

/// Normalize a post timestamp to ISO-8601 UTC, keeping it untouched when it
/// already has a zone or cannot be parsed.
pub fn normalize_timestamp(raw: &str) -> String {
    let raw = raw.trim();

    if HAS_ZONE.is_match(raw) {
        return raw.to_string();
    }

    if BARE_DATE.is_match(raw) {
        let midnight = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0));
        if let Some(midnight) = midnight {
            return to_iso(midnight);
        }
    }

    match parse_loose(raw) {
        Some(utc) => utc.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => {
            debug!(raw, "Unparseable post date; keeping raw value");
            raw.to_string()
        }
    }
}

fn to_iso(naive: NaiveDateTime) -> String {
    naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_loose(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Upper bound on a believable page count. Anything above is treated as a
/// markup anomaly.
pub const MAX_PAGE_COUNT: u32 = 10_000;

/// Number of pages in the thread, between 1 and [`MAX_PAGE_COUNT`].
///
/// Only the pagination region (`.pageNav-main` / `.pageNavSimple`) is read.
/// The highest numbered page link wins; without links the "N of M"
/// indicator is used.
///
/// # Returns
///
/// `1` when the page has no pagination, when it cannot be read, or when it
/// claims more than [`MAX_PAGE_COUNT`] pages.
pub fn extract_page_count(page: &ParsedPage) -> u32 {
    let navs: Vec<ElementRef<'_>> = page.document().select(&PAGE_NAV).collect();
    if navs.is_empty() {
        return 1;
    }

    let highest_link = navs
        .iter()
        .flat_map(|nav| nav.select(&PAGE_LINK))
        .filter_map(|a| a.text().collect::<String>().trim().parse::<u32>().ok())
        .max();

    let count = highest_link.or_else(|| {
        navs.iter()
            .flat_map(|nav| nav.select(&PAGE_CURRENT))
            .map(|el| el.text().collect::<String>())
            .find_map(|text| {
                let text = text.trim();
                match OF_TOTAL.captures(text) {
                    Some(caps) => caps[1].parse::<u32>().ok(),
                    None => text.parse::<u32>().ok(),
                }
            })
    });

    match count {
        Some(n) if n > MAX_PAGE_COUNT => {
            debug!(n, max = MAX_PAGE_COUNT, "Implausible page count; assuming one page");
            1
        }
        Some(n) => n.max(1),
        None => {
            debug!("Pagination present but unreadable; assuming one page");
            1
        }
    }
}
