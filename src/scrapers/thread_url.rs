//! Thread URL validation and canonicalization.
//!
//! Users paste whatever URL is in their address bar: page 7 of a thread, a
//! permalink to a single post (`#post-123`), or the bare thread. All of those
//! map to one canonical first-page URL ending in `/`, which is what page URLs
//! are built from.

use crate::error::HarvestError;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static PAGE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/page-\d+/?$").unwrap());

/// Canonicalize `raw_url` as a thread on `forum_domain`.
///
/// Accepts the domain itself or any subdomain (`www.technofino.in` for
/// `technofino.in`). The fragment, the query string and a trailing
/// `/page-<N>` segment are removed, and a non-root path always ends in `/`.
pub fn normalize(raw_url: &str, forum_domain: &str) -> Result<String, HarvestError> {
    let trimmed = raw_url.trim();
    let mut url =
        Url::parse(trimmed).map_err(|e| HarvestError::invalid_url(trimmed, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HarvestError::invalid_url(
            trimmed,
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }

    let host = url
        .host_str()
        .ok_or_else(|| HarvestError::invalid_url(trimmed, "missing host"))?;
    if !host_matches(host, forum_domain) {
        return Err(HarvestError::invalid_url(
            trimmed,
            format!("host {host:?} is not {forum_domain}"),
        ));
    }

    url.set_fragment(None);
    url.set_query(None);

    let mut path = PAGE_SUFFIX.replace(url.path(), "").into_owned();
    if path.is_empty() {
        path.push('/');
    }
    if path != "/" && !path.ends_with('/') {
        path.push('/');
    }
    url.set_path(&path);

    Ok(url.to_string())
}

fn host_matches(host: &str, forum_domain: &str) -> bool {
    let domain = forum_domain.trim().trim_start_matches('.').to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}
