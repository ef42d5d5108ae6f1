//! Whole-thread harvesting.
//!
//! A harvest walks a fixed sequence of stages:
//!
//! ```text
//! Validating → FetchingFirstPage → Planning → FetchingRemaining → Aggregating → Done
//! ```
//!
//! Page 1 is fetched alone because it carries the pagination bar; without it
//! there is nothing to plan, so a failure there ends the run as `Failed`.
//! Pages 2..N are then fetched concurrently. Each of those fetches resolves to
//! a [`PageResult`] whether it worked or not, and the results are joined in
//! page order, so completion order never leaks into the corpus.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::models::{HarvestResult, PageResult, Stage};
use crate::scrapers::extract::{extract_messages, extract_page_count};
use crate::scrapers::fetch::PageFetcher;
use crate::scrapers::pagination::{self, PlannedPage};
use crate::scrapers::thread_url;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub message: String,
}

/// Receives progress notifications. Implementations must return promptly;
/// the harvester does not wait on anything they do.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn emit(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Sink that drops every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _update: ProgressUpdate) {}
}

/// Harvests forum threads through a [`PageFetcher`].
pub struct ThreadHarvester<F> {
    fetcher: F,
    forum_domain: String,
    pacing: Duration,
}

impl<F: PageFetcher> ThreadHarvester<F> {
    pub fn new(fetcher: F, config: &HarvestConfig) -> Self {
        Self {
            fetcher,
            forum_domain: config.forum_domain.clone(),
            pacing: config.pacing(),
        }
    }

    /// Harvest the thread behind `raw_url`.
    ///
    /// Network and markup problems never escape as errors; they end up in the
    /// returned result's `status`, `failure` and `page_errors`.
    #[instrument(level = "info", skip(self, progress))]
    pub async fn harvest(&self, raw_url: &str, progress: &dyn ProgressSink) -> HarvestResult {
        let mut run = Run::new(progress);

        run.enter(Stage::Validating, format!("Validating {raw_url}"));
        let canonical = match thread_url::normalize(raw_url, &self.forum_domain) {
            Ok(url) => url,
            Err(e) => return run.fail(raw_url.to_string(), e),
        };
        if canonical != raw_url {
            debug!(%canonical, "Normalized thread URL");
        }

        run.enter(
            Stage::FetchingFirstPage,
            format!("Fetching page 1: {canonical}"),
        );
        // The parsed document is not `Send`; keep it out of any later await.
        let (first_messages, page_count) = match self.fetcher.fetch(&canonical).await {
            Ok(first) => (extract_messages(&first), extract_page_count(&first)),
            Err(e) => return run.fail(canonical, HarvestError::Fetch(e)),
        };
        run.enter(
            Stage::Planning,
            format!(
                "Thread has {page_count} page(s); found {} message(s) on page 1",
                first_messages.len()
            ),
        );
        if first_messages.is_empty() && page_count == 1 {
            run.enter(
                Stage::Done,
                "Harvest complete: 0 message(s), no messages found in thread".to_string(),
            );
            info!(%canonical, "Thread is empty");
            return HarvestResult::empty(canonical, page_count);
        }
        let remaining = pagination::plan(page_count, &canonical);

        let mut pages = Vec::with_capacity(page_count as usize);
        pages.push(PageResult::succeeded(1, first_messages));

        if !remaining.is_empty() {
            run.enter(
                Stage::FetchingRemaining,
                format!("Fetching pages 2-{page_count}"),
            );
            pages.extend(self.fetch_remaining(&remaining, page_count, progress).await);
        }

        run.enter(Stage::Aggregating, format!("Combining {} page(s)", pages.len()));
        let result = HarvestResult::from_pages(canonical, page_count, pages);

        run.enter(
            Stage::Done,
            format!(
                "Harvest complete: {} message(s), {} failed page(s)",
                result.messages.len(),
                result.page_errors.len()
            ),
        );
        info!(
            status = ?result.status,
            messages = result.messages.len(),
            page_errors = result.page_errors.len(),
            "Harvest finished"
        );
        result
    }

    /// Fetch every planned page concurrently; the k-th dispatch is delayed by
    /// `k * pacing`. The returned results are in planned (page) order.
    async fn fetch_remaining(
        &self,
        planned: &[PlannedPage],
        total: u32,
        progress: &dyn ProgressSink,
    ) -> Vec<PageResult> {
        let fetches = planned.iter().enumerate().map(|(i, page)| {
            let delay = self.pacing * (i as u32 + 1);
            async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                progress.emit(ProgressUpdate {
                    stage: Stage::FetchingRemaining,
                    message: format!("Fetching page {} of {total}: {}", page.number, page.url),
                });
                self.fetch_page(page, total, progress).await
            }
        });
        join_all(fetches).await
    }

    async fn fetch_page(
        &self,
        page: &PlannedPage,
        total: u32,
        progress: &dyn ProgressSink,
    ) -> PageResult {
        match self.fetcher.fetch(&page.url).await {
            Ok(parsed) => {
                let messages = extract_messages(&parsed);
                debug!(page = page.number, count = messages.len(), "Extracted page");
                progress.emit(ProgressUpdate {
                    stage: Stage::FetchingRemaining,
                    message: format!(
                        "Fetched page {} of {total}: {} message(s)",
                        page.number,
                        messages.len()
                    ),
                });
                PageResult::succeeded(page.number, messages)
            }
            Err(e) => {
                warn!(page = page.number, error = %e, "Page fetch failed; continuing");
                progress.emit(ProgressUpdate {
                    stage: Stage::FetchingRemaining,
                    message: format!("Failed to fetch page {} of {total}: {e}", page.number),
                });
                PageResult::failed(page.number, &e)
            }
        }
    }
}

/// Orchestration state of a single harvest.
struct Run<'a> {
    stage: Option<Stage>,
    progress: &'a dyn ProgressSink,
}

impl<'a> Run<'a> {
    fn new(progress: &'a dyn ProgressSink) -> Self {
        Self {
            stage: None,
            progress,
        }
    }

    fn enter(&mut self, stage: Stage, message: String) {
        debug_assert!(self.stage.is_none_or(|current| current < stage));
        self.stage = Some(stage);
        self.progress.emit(ProgressUpdate { stage, message });
    }

    fn fail(mut self, thread_url: String, error: HarvestError) -> HarvestResult {
        let stage = self.stage.unwrap_or(Stage::Validating);
        error!(%stage, error = %error, "Harvest failed");
        self.progress.emit(ProgressUpdate {
            stage,
            message: format!("Failed: {error}"),
        });
        self.enter(Stage::Done, "Harvest aborted".to_string());
        HarvestResult::failed(thread_url, stage, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchStatus};
    use crate::models::HarvestStatus;
    use crate::scrapers::extract::ParsedPage;
    use itertools::Itertools;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const BASE: &str = "https://www.technofino.in/community/threads/best-forex-card.999/";

    #[derive(Clone)]
    enum Reply {
        Page(String),
        Fail(FetchStatus),
    }

    /// Serves canned pages with per-URL latency.
    #[derive(Default)]
    struct FakeForum {
        pages: HashMap<String, (Duration, Reply)>,
        calls: AtomicUsize,
        started: Mutex<Vec<(String, Instant)>>,
        completed: Mutex<Vec<String>>,
    }

    impl FakeForum {
        fn page(mut self, url: &str, delay_ms: u64, html: String) -> Self {
            self.pages
                .insert(url.to_string(), (Duration::from_millis(delay_ms), Reply::Page(html)));
            self
        }

        fn failing(mut self, url: &str, delay_ms: u64, status: FetchStatus) -> Self {
            self.pages
                .insert(url.to_string(), (Duration::from_millis(delay_ms), Reply::Fail(status)));
            self
        }
    }

    impl PageFetcher for FakeForum {
        async fn fetch(&self, url: &str) -> Result<ParsedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started
                .lock()
                .unwrap()
                .push((url.to_string(), Instant::now()));
            let (delay, reply) = self
                .pages
                .get(url)
                .cloned()
                .unwrap_or((Duration::ZERO, Reply::Fail(FetchStatus::Http(404))));
            sleep(delay).await;
            self.completed.lock().unwrap().push(url.to_string());
            match reply {
                Reply::Page(html) => Ok(ParsedPage::parse(&html)),
                Reply::Fail(status) => Err(FetchError::new(status, url)),
            }
        }
    }

    fn thread_page(last_page: u32, bodies: &[&str]) -> String {
        let nav = if last_page > 1 {
            let links: String = (1..=last_page)
                .map(|n| format!(r#"<li class="pageNav-page"><a href="page-{n}">{n}</a></li>"#))
                .collect();
            format!(r#"<ul class="pageNav-main">{links}</ul>"#)
        } else {
            String::new()
        };
        let posts: String = bodies
            .iter()
            .map(|body| {
                format!(
                    r#"<article class="message">
                        <div class="message-user"><a class="username">member</a></div>
                        <time class="u-dt" datetime="2024-02-01T09:30:00+0530">Feb 1</time>
                        <div class="message-content"><div class="bbWrapper">{body}</div></div>
                    </article>"#
                )
            })
            .collect();
        format!("<html><head><title>Thread</title></head><body>{nav}{posts}</body></html>")
    }

    fn page_url(n: u32) -> String {
        format!("{BASE}page-{n}/")
    }

    fn harvester(forum: FakeForum) -> ThreadHarvester<FakeForum> {
        paced_harvester(forum, 0)
    }

    fn paced_harvester(forum: FakeForum, pacing_ms: u64) -> ThreadHarvester<FakeForum> {
        let config = HarvestConfig {
            pacing_ms,
            ..HarvestConfig::default()
        };
        ThreadHarvester::new(forum, &config)
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn harvest_future_is_send() {
        let harvester = harvester(FakeForum::default());
        let sink = |_: ProgressUpdate| {};
        assert_send(&harvester.harvest(BASE, &NoProgress));
        assert_send(&harvester.harvest(BASE, &sink));

        let real = ThreadHarvester::new(
            crate::scrapers::fetch::ReqwestFetcher::new(&HarvestConfig::default()).unwrap(),
            &HarvestConfig::default(),
        );
        assert_send(&real.harvest(BASE, &NoProgress));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn harvest_runs_on_a_spawned_task() {
        let forum = FakeForum::default()
            .page(BASE, 0, thread_page(2, &["a"]))
            .page(&page_url(2), 0, thread_page(2, &["b"]));
        let harvester = std::sync::Arc::new(harvester(forum));

        let task = tokio::spawn({
            let harvester = harvester.clone();
            async move { harvester.harvest(BASE, &NoProgress).await }
        });
        let result = task.await.unwrap();

        assert_eq!(bodies(&result), ["a", "b"]);
    }

    fn bodies(result: &HarvestResult) -> Vec<&str> {
        result.messages.iter().map(|m| m.body.as_str()).collect()
    }

    #[tokio::test]
    async fn partial_failure_keeps_other_pages() {
        let forum = FakeForum::default()
            .page(BASE, 0, thread_page(3, &["p1a", "p1b"]))
            .failing(&page_url(2), 0, FetchStatus::Http(503))
            .page(&page_url(3), 0, thread_page(3, &["p3a", "p3b", "p3c"]));

        let result = harvester(forum).harvest(BASE, &NoProgress).await;

        assert_eq!(result.status, HarvestStatus::PartialSuccess);
        assert_eq!(result.total_pages_discovered, 3);
        assert_eq!(result.messages.len(), 5);
        assert_eq!(bodies(&result), ["p1a", "p1b", "p3a", "p3b", "p3c"]);
        assert_eq!(result.page_errors.len(), 1);
        assert_eq!(result.page_errors[0].page_number, 2);
        assert_eq!(result.page_errors[0].status, FetchStatus::Http(503));
        assert_eq!(result.page_errors[0].url, page_url(2));
    }

    #[tokio::test]
    async fn order_follows_pages_not_completion() {
        for delays in [0u64, 40, 80].into_iter().permutations(3) {
            let forum = FakeForum::default()
                .page(BASE, 0, thread_page(4, &["1"]))
                .page(&page_url(2), delays[0], thread_page(4, &["2"]))
                .page(&page_url(3), delays[1], thread_page(4, &["3"]))
                .page(&page_url(4), delays[2], thread_page(4, &["4"]));
            let harvester = harvester(forum);

            let result = harvester.harvest(BASE, &NoProgress).await;

            let expected_completion: Vec<String> = std::iter::once(BASE.to_string())
                .chain(
                    (2..=4)
                        .sorted_by_key(|&n| delays[n as usize - 2])
                        .map(page_url),
                )
                .collect();
            let completed = harvester.fetcher.completed.lock().unwrap().clone();
            assert_eq!(completed, expected_completion, "delays {delays:?}");
            assert_eq!(bodies(&result), ["1", "2", "3", "4"], "delays {delays:?}");
            assert_eq!(result.status, HarvestStatus::Success);
        }
    }

    #[tokio::test]
    async fn pacing_staggers_dispatch_without_serializing_waits() {
        let pacing = Duration::from_millis(50);
        let latency = 300;
        let mut forum = FakeForum::default().page(BASE, 0, thread_page(5, &["1"]));
        for n in 2..=5 {
            forum = forum.page(&page_url(n), latency, thread_page(5, &[&n.to_string()]));
        }
        let harvester = paced_harvester(forum, 50);

        let t0 = Instant::now();
        let result = harvester.harvest(BASE, &NoProgress).await;
        let elapsed = t0.elapsed();

        assert_eq!(result.messages.len(), 5);
        let started = harvester.fetcher.started.lock().unwrap().clone();
        let urls: Vec<&str> = started.iter().map(|(url, _)| url.as_str()).collect();
        assert_eq!(urls, [BASE.to_string(), page_url(2), page_url(3), page_url(4), page_url(5)]);
        let first = started[0].1;
        for (k, (_, at)) in started.iter().enumerate().skip(1) {
            assert!(
                at.duration_since(first) >= pacing * k as u32,
                "page {} started too early",
                k + 1
            );
        }
        // Sequential waits would take at least 4 * 300ms.
        assert!(elapsed < Duration::from_millis(900), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn fetches_overlap_instead_of_running_in_sequence() {
        let forum = FakeForum::default()
            .page(BASE, 0, thread_page(5, &["1"]))
            .page(&page_url(2), 200, thread_page(5, &["2"]))
            .page(&page_url(3), 200, thread_page(5, &["3"]))
            .page(&page_url(4), 200, thread_page(5, &["4"]))
            .page(&page_url(5), 200, thread_page(5, &["5"]));

        let started = std::time::Instant::now();
        let result = harvester(forum).harvest(BASE, &NoProgress).await;

        assert_eq!(result.messages.len(), 5);
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn single_page_without_posts_is_empty_thread() {
        let forum = FakeForum::default().page(BASE, 0, thread_page(1, &[]));
        let harvester = harvester(forum);
        let updates = Mutex::new(Vec::new());
        let sink = |update: ProgressUpdate| updates.lock().unwrap().push(update);

        let result = harvester.harvest(BASE, &sink).await;

        assert_eq!(result.status, HarvestStatus::EmptyThread);
        assert!(result.messages.is_empty());
        assert!(result.page_errors.is_empty());
        assert_eq!(harvester.fetcher.calls.load(Ordering::SeqCst), 1);
        let updates = updates.into_inner().unwrap();
        let last = updates.last().unwrap();
        assert_eq!(last.stage, Stage::Done);
        assert!(last.message.contains("0 message(s)"));
    }

    #[tokio::test]
    async fn foreign_domain_fails_before_any_fetch() {
        let harvester = harvester(FakeForum::default());

        let result = harvester
            .harvest("https://example.com/thread/1", &NoProgress)
            .await;

        assert_eq!(result.status, HarvestStatus::Failed);
        let failure = result.failure.expect("failure recorded");
        assert_eq!(failure.stage, Stage::Validating);
        assert!(matches!(failure.error, HarvestError::InvalidUrl { .. }));
        assert!(result.messages.is_empty());
        assert_eq!(harvester.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_page_failure_is_fatal() {
        let forum = FakeForum::default().failing(BASE, 0, FetchStatus::ContentError);

        let result = harvester(forum).harvest(BASE, &NoProgress).await;

        assert_eq!(result.status, HarvestStatus::Failed);
        assert_eq!(result.thread_url, BASE);
        let failure = result.failure.expect("failure recorded");
        assert_eq!(failure.stage, Stage::FetchingFirstPage);
        assert!(matches!(
            failure.error,
            HarvestError::Fetch(FetchError { status: FetchStatus::ContentError, .. })
        ));
    }

    #[tokio::test]
    async fn all_remaining_pages_failing_is_still_partial() {
        let forum = FakeForum::default()
            .page(BASE, 0, thread_page(3, &["only"]))
            .failing(&page_url(2), 0, FetchStatus::Timeout)
            .failing(&page_url(3), 0, FetchStatus::Http(403));

        let result = harvester(forum).harvest(BASE, &NoProgress).await;

        assert_eq!(result.status, HarvestStatus::PartialSuccess);
        assert_eq!(bodies(&result), ["only"]);
        let failed: Vec<_> = result.page_errors.iter().map(|e| e.page_number).collect();
        assert_eq!(failed, [2, 3]);
    }

    #[tokio::test]
    async fn empty_first_page_of_multi_page_thread_keeps_going() {
        let forum = FakeForum::default()
            .page(BASE, 0, thread_page(2, &[]))
            .page(&page_url(2), 0, thread_page(2, &["late reply"]));

        let result = harvester(forum).harvest(BASE, &NoProgress).await;

        assert_eq!(result.status, HarvestStatus::Success);
        assert_eq!(bodies(&result), ["late reply"]);
    }

    #[tokio::test]
    async fn any_page_url_harvests_from_first_page() {
        let forum = FakeForum::default()
            .page(BASE, 0, thread_page(2, &["a"]))
            .page(&page_url(2), 0, thread_page(2, &["b"]));
        let harvester = harvester(forum);

        let result = harvester
            .harvest(&format!("{BASE}page-2#post-77"), &NoProgress)
            .await;

        assert_eq!(result.thread_url, BASE);
        assert_eq!(bodies(&result), ["a", "b"]);
        assert_eq!(harvester.fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn progress_reports_stages_and_each_page() {
        let forum = FakeForum::default()
            .page(BASE, 0, thread_page(3, &["a"]))
            .page(&page_url(2), 0, thread_page(3, &["b"]))
            .failing(&page_url(3), 0, FetchStatus::Http(404));
        let updates = Mutex::new(Vec::new());
        let sink = |update: ProgressUpdate| updates.lock().unwrap().push(update);

        harvester(forum).harvest(BASE, &sink).await;

        let updates = updates.into_inner().unwrap();
        let mut stages: Vec<Stage> = updates.iter().map(|u| u.stage).collect();
        stages.dedup();
        assert_eq!(
            stages,
            [
                Stage::Validating,
                Stage::FetchingFirstPage,
                Stage::Planning,
                Stage::FetchingRemaining,
                Stage::Aggregating,
                Stage::Done,
            ]
        );
        let messages: Vec<&str> = updates.iter().map(|u| u.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.starts_with("Fetching page 2 of 3")));
        assert!(messages.iter().any(|m| m.starts_with("Fetched page 2 of 3")));
        assert!(messages.iter().any(|m| m.starts_with("Failed to fetch page 3 of 3")));
        assert!(messages.last().unwrap().contains("2 message(s)"));
    }

    #[tokio::test]
    async fn validation_failure_is_reported_to_progress() {
        let updates = Mutex::new(Vec::new());
        let sink = |update: ProgressUpdate| updates.lock().unwrap().push(update);

        harvester(FakeForum::default()).harvest("nonsense", &sink).await;

        let updates = updates.into_inner().unwrap();
        assert_eq!(updates[0].stage, Stage::Validating);
        assert_eq!(updates[1].stage, Stage::Validating);
        assert!(updates[1].message.starts_with("Failed:"));
        assert_eq!(updates.last().unwrap().stage, Stage::Done);
    }
}
