//! Page URL planning for pages 2..N of a thread.

/// A page still to be fetched after the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPage {
    pub number: u32,
    pub url: String,
}

/// Build `<canonical>page-<n>/` for every page after the first.
///
/// `canonical_url` must come from [`super::thread_url::normalize`], which
/// guarantees the trailing `/`.
pub fn plan(page_count: u32, canonical_url: &str) -> Vec<PlannedPage> {
    (2..=page_count)
        .map(|number| PlannedPage {
            number,
            url: format!("{canonical_url}page-{number}/"),
        })
        .collect()
}
