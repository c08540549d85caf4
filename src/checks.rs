//! Fan-out of remote URL/DOI checks.
//!
//! The check itself belongs to an external service behind [`CheckService`].
//! [`CheckDispatcher`] owns the shared concerns: one outcome per unique target
//! across every run sharing the dispatcher, a global in-flight cap, a
//! per-request timeout, and a join that waits for all requests of a run.
//! A failed or timed-out check is recorded as [`CheckOutcome::Unchecked`].

use crate::archive::KnownArchive;
use crate::config::{DEFAULT_CHECK_CONCURRENCY, DEFAULT_CHECK_TIMEOUT};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CheckTarget {
    Url(String),
    Doi(String),
}

impl CheckTarget {
    /// Trimmed; DOIs compared case-insensitively.
    pub fn normalized(self) -> Self {
        match self {
            CheckTarget::Url(url) => CheckTarget::Url(url.trim().to_string()),
            CheckTarget::Doi(doi) => CheckTarget::Doi(doi.trim().to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub status_code: Option<u16>,
    pub detected_archive: Option<KnownArchive>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Checked(CheckReport),
    Unchecked,
}

impl CheckOutcome {
    pub fn is_checked(&self) -> bool {
        matches!(self, CheckOutcome::Checked(_))
    }
}

#[async_trait]
pub trait CheckService: Send + Sync {
    async fn check(&self, target: &CheckTarget) -> anyhow::Result<CheckReport>;
}

pub struct CheckDispatcher<S> {
    service: Arc<S>,
    outcomes: Arc<DashMap<CheckTarget, Arc<OnceCell<CheckOutcome>>>>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    window: usize,
    requests_sent: Arc<AtomicU64>,
}

impl<S> Clone for CheckDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            outcomes: Arc::clone(&self.outcomes),
            permits: Arc::clone(&self.permits),
            timeout: self.timeout,
            window: self.window,
            requests_sent: Arc::clone(&self.requests_sent),
        }
    }
}

impl<S: CheckService> CheckDispatcher<S> {
    pub fn new(service: S) -> Self {
        Self::with_limits(service, DEFAULT_CHECK_CONCURRENCY, DEFAULT_CHECK_TIMEOUT)
    }

    pub fn with_limits(service: S, max_in_flight: usize, timeout: Duration) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            service: Arc::new(service),
            outcomes: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            timeout,
            window: max_in_flight,
            requests_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Requests actually sent to the service, across all runs.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Outcome for one target. Concurrent callers asking for the same target
    /// share a single request.
    pub async fn check(&self, target: CheckTarget) -> CheckOutcome {
        let target = target.normalized();
        let cell = Arc::clone(self.outcomes.entry(target.clone()).or_default().value());
        cell.get_or_init(|| self.send(&target)).await.clone()
    }

    async fn send(&self, target: &CheckTarget) -> CheckOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return CheckOutcome::Unchecked;
        };
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.timeout, self.service.check(target)).await {
            Ok(Ok(report)) => CheckOutcome::Checked(report),
            Ok(Err(e)) => {
                warn!(target = ?target, error = %e, "Remote check failed");
                CheckOutcome::Unchecked
            }
            Err(_) => {
                warn!(target = ?target, timeout = ?self.timeout, "Remote check timed out");
                CheckOutcome::Unchecked
            }
        }
    }

    /// Checks every unique target, at most `window` polled at once, and
    /// returns when all of them have an outcome.
    pub async fn check_all(
        &self,
        targets: impl IntoIterator<Item = CheckTarget>,
    ) -> FxHashMap<CheckTarget, CheckOutcome> {
        let mut seen = FxHashSet::default();
        let pending: Vec<CheckTarget> = targets
            .into_iter()
            .map(CheckTarget::normalized)
            .filter(|t| seen.insert(t.clone()))
            .collect();

        let mut results: FxHashMap<CheckTarget, CheckOutcome> = FxHashMap::default();
        let mut queue = pending.into_iter();
        let mut in_flight = FuturesUnordered::new();
        for target in queue.by_ref().take(self.window) {
            in_flight.push(self.check_pair(target));
        }
        while let Some((target, outcome)) = in_flight.next().await {
            results.insert(target, outcome);
            if let Some(next) = queue.next() {
                in_flight.push(self.check_pair(next));
            }
        }

        debug!(
            targets = results.len(),
            checked = results.values().filter(|o| o.is_checked()).count(),
            "Remote checks finished"
        );
        results
    }

    async fn check_pair(&self, target: CheckTarget) -> (CheckTarget, CheckOutcome) {
        let outcome = self.check(target.clone()).await;
        (target, outcome)
    }
}

/// Aggregate of one run's check outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub number_of_checked_urls: usize,
    pub number_of_unchecked_urls: usize,
    pub number_of_checked_dois: usize,
    pub number_of_unchecked_dois: usize,
    pub number_of_urls_detected_as_archives: usize,
}

impl CheckSummary {
    pub fn from_outcomes<'a>(
        outcomes: impl IntoIterator<Item = (&'a CheckTarget, &'a CheckOutcome)>,
    ) -> Self {
        let mut summary = Self::default();
        for (target, outcome) in outcomes {
            match (target, outcome) {
                (CheckTarget::Url(_), CheckOutcome::Checked(report)) => {
                    summary.number_of_checked_urls += 1;
                    if report.detected_archive.is_some() {
                        summary.number_of_urls_detected_as_archives += 1;
                    }
                }
                (CheckTarget::Url(_), CheckOutcome::Unchecked) => {
                    summary.number_of_unchecked_urls += 1
                }
                (CheckTarget::Doi(_), CheckOutcome::Checked(_)) => {
                    summary.number_of_checked_dois += 1
                }
                (CheckTarget::Doi(_), CheckOutcome::Unchecked) => {
                    summary.number_of_unchecked_dois += 1
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::detect_archive;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CheckService for FakeService {
        async fn check(&self, target: &CheckTarget) -> anyhow::Result<CheckReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            match target {
                CheckTarget::Url(url) if url.contains("slow") => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(CheckReport { status_code: Some(200), detected_archive: None })
                }
                CheckTarget::Url(url) if url.contains("broken") => anyhow::bail!("connection refused"),
                CheckTarget::Url(url) => Ok(CheckReport {
                    status_code: Some(200),
                    detected_archive: detect_archive(url),
                }),
                CheckTarget::Doi(_) => Ok(CheckReport { status_code: None, detected_archive: None }),
            }
        }
    }

    fn url(u: &str) -> CheckTarget {
        CheckTarget::Url(u.to_string())
    }

    #[tokio::test]
    async fn duplicates_checked_once() {
        let dispatcher = CheckDispatcher::with_limits(FakeService::default(), 2, Duration::from_secs(1));
        let results = dispatcher
            .check_all(vec![url("http://a.com"), url("http://a.com "), url("http://b.com")])
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(dispatcher.requests_sent(), 2);

        // a second run sharing the dispatcher reuses the outcomes
        let again = dispatcher.clone().check_all(vec![url("http://b.com")]).await;
        assert!(again[&url("http://b.com")].is_checked());
        assert_eq!(dispatcher.requests_sent(), 2);
        assert_eq!(dispatcher.service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_targets_in_one_run_sent_once() {
        let dispatcher = CheckDispatcher::with_limits(FakeService::default(), 1, Duration::from_secs(1));
        let targets = vec![
            url("http://a.com"),
            CheckTarget::Doi("10.1/X".to_string()),
            url(" http://a.com"),
            CheckTarget::Doi("10.1/x ".to_string()),
            url("http://b.com"),
            url("http://a.com"),
        ];
        let results = dispatcher.check_all(targets).await;
        assert_eq!(results.len(), 3);
        assert!(results.contains_key(&CheckTarget::Doi("10.1/x".to_string())));
        assert_eq!(dispatcher.requests_sent(), 3);
        assert_eq!(dispatcher.service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_and_timeout_are_unchecked() {
        let dispatcher =
            CheckDispatcher::with_limits(FakeService::default(), 4, Duration::from_millis(100));
        let targets = vec![
            url("http://slow.example.com"),
            url("http://broken.example.com"),
            url("https://web.archive.org/web/2010/http://x.org"),
            CheckTarget::Doi("10.1/ABC".to_string()),
        ];
        let results = dispatcher.check_all(targets).await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[&url("http://slow.example.com")], CheckOutcome::Unchecked);
        assert_eq!(results[&url("http://broken.example.com")], CheckOutcome::Unchecked);
        assert!(results[&CheckTarget::Doi("10.1/abc".to_string())].is_checked());

        let summary = CheckSummary::from_outcomes(&results);
        assert_eq!(summary.number_of_checked_urls, 1);
        assert_eq!(summary.number_of_unchecked_urls, 2);
        assert_eq!(summary.number_of_checked_dois, 1);
        assert_eq!(summary.number_of_urls_detected_as_archives, 1);
    }

    #[tokio::test]
    async fn concurrent_runs_share_requests() {
        let dispatcher = CheckDispatcher::with_limits(FakeService::default(), 8, Duration::from_secs(1));
        let a = dispatcher.clone();
        let b = dispatcher.clone();
        let targets = || vec![url("http://a.com"), url("http://b.com"), url("http://c.com")];
        let (ra, rb) = tokio::join!(a.check_all(targets()), b.check_all(targets()));
        assert_eq!(ra, rb);
        assert_eq!(dispatcher.requests_sent(), 3);
    }

    #[tokio::test]
    async fn summary_attaches_to_statistics() {
        let state = crate::extractor::ExtractorState::extract(
            "<ref>{{cite journal|doi=10.1/x|url=http://a.com}}</ref><ref>{{cite web|url=http://a.com}}</ref>",
            &crate::config::ExtractorConfig::default(),
        )
        .unwrap();
        let dispatcher = CheckDispatcher::new(FakeService::default());
        let results = dispatcher.check_all(state.check_targets()).await;
        let stats = state
            .statistics()
            .with_checks(CheckSummary::from_outcomes(&results));
        let checks = stats.checks.unwrap();
        assert_eq!(checks.number_of_checked_urls, 1);
        assert_eq!(checks.number_of_checked_dois, 1);
        assert_eq!(dispatcher.requests_sent(), 2);
    }
}
