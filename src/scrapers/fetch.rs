//! Page retrieval.
//!
//! A fetch is one GET followed by an explicit classification of what came
//! back. The forum answers 200 for its own error page (private thread, login
//! wall, deleted thread), so a status check alone is not enough.

use crate::config::HarvestConfig;
use crate::error::{FetchError, FetchStatus};
use crate::scrapers::extract::ParsedPage;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// What a response turned out to be.
pub enum PageOutcome {
    Ok(ParsedPage),
    SiteError,
    HttpError(u16),
}

/// Classify a raw response. Non-2xx statuses are never parsed.
pub fn classify(status: u16, body: &str) -> PageOutcome {
    if !(200..300).contains(&status) {
        return PageOutcome::HttpError(status);
    }
    let page = ParsedPage::parse(body);
    if page.is_site_error() {
        PageOutcome::SiteError
    } else {
        PageOutcome::Ok(page)
    }
}

impl PageOutcome {
    pub fn into_result(self, url: &str) -> Result<ParsedPage, FetchError> {
        match self {
            PageOutcome::Ok(page) => Ok(page),
            PageOutcome::SiteError => Err(FetchError::new(FetchStatus::ContentError, url)),
            PageOutcome::HttpError(code) => Err(FetchError::new(FetchStatus::Http(code), url)),
        }
    }
}

/// Retrieves and parses one thread page.
///
/// Implementations are shared by every concurrent page fetch of a harvest,
/// and the returned future must be `Send` so a harvest can run on a
/// multi-threaded runtime.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<ParsedPage, FetchError>> + Send;
}

/// [`PageFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self, Box<dyn Error>> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for ReqwestFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ParsedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from((e, url)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from((e, url)))?;
        debug!(status, bytes = body.len(), "Received page");

        let result = classify(status, &body).into_result(url);
        if let Err(ref e) = result {
            warn!(error = %e, "Page fetch rejected");
        }
        result
    }
}
