pub mod extract;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use indicatif::ProgressBar;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::task::{self, AbortHandle};
use tracing::{debug, info, warn};
use url::Url;

use crate::http::HttpClient;
use crate::membership::VisitedSet;
use crate::stop::StopSignal;
use crate::utils;

pub const DEFAULT_MAX_DEPTH: usize = 2;
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid seed URL: {url}")]
    InvalidSeed { url: String },
}

#[derive(Clone, Debug)]
pub struct CrawlConfig {
    pub max_depth: usize,
    pub request_delay: Duration,
    /// Upper bound of the random extra delay added to `request_delay`.
    pub jitter: Duration,
    pub workers: usize,
    /// The crawl ends when no task completes within this window.
    pub inactivity_timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            request_delay: Duration::from_millis(500),
            jitter: Duration::ZERO,
            workers: DEFAULT_WORKERS,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: String,
    pub depth: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum PageOutcome {
    Ok,
    Skipped,
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FormInput {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub input_type: String,
    pub default_value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Form {
    /// Absolute submission URL.
    pub action: String,
    /// Upper-cased HTTP method.
    pub method: String,
    pub inputs: Vec<FormInput>,
}

impl Form {
    /// Identity used to avoid testing the same form found on several pages.
    pub fn signature(&self) -> (String, String, Vec<Option<String>>) {
        (
            self.action.clone(),
            self.method.clone(),
            self.inputs.iter().map(|i| i.name.clone()).collect(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageResult {
    pub url: String,
    pub depth: usize,
    pub status: Option<u16>,
    pub links: Vec<String>,
    pub forms: Vec<Form>,
    pub outcome: PageOutcome,
}

impl PageResult {
    fn failed(task: &CrawlTask, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            url: task.url.clone(),
            depth: task.depth,
            status,
            links: Vec::new(),
            forms: Vec::new(),
            outcome: PageOutcome::Error(reason.into()),
        }
    }

    fn skipped(task: &CrawlTask, status: Option<u16>) -> Self {
        Self {
            url: task.url.clone(),
            depth: task.depth,
            status,
            links: Vec::new(),
            forms: Vec::new(),
            outcome: PageOutcome::Skipped,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == PageOutcome::Ok
    }
}

/// Breadth-first, depth-bounded, same-origin crawler.
///
/// A single coordinator owns the frontier; fetches run on a bounded set of
/// spawned tasks. Every discovered URL goes through the shared
/// [`VisitedSet`] before it is queued, so a URL is scheduled at most once.
pub struct Crawler {
    client: HttpClient,
    config: CrawlConfig,
    visited: Arc<VisitedSet>,
    progress: ProgressBar,
}

impl Crawler {
    pub fn new(client: HttpClient, config: CrawlConfig) -> Self {
        Self {
            client,
            config,
            visited: Arc::new(VisitedSet::default()),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_visited(mut self, visited: Arc<VisitedSet>) -> Self {
        self.visited = visited;
        self
    }

    pub fn visited(&self) -> &Arc<VisitedSet> {
        &self.visited
    }

    /// Crawls from `seed_url` and returns one result per fetched task, in
    /// completion order. Stops early on `stop`, or when nothing completes
    /// within the inactivity window; results gathered so far are returned.
    pub async fn crawl(
        &self,
        seed_url: &str,
        stop: &StopSignal,
    ) -> Result<Vec<PageResult>, CrawlError> {
        let seed = Url::parse(seed_url.trim())
            .ok()
            .filter(|u| utils::is_valid_http_url(u.as_str()))
            .ok_or_else(|| CrawlError::InvalidSeed {
                url: seed_url.to_string(),
            })?;
        let origin = Arc::new(seed.clone());
        let workers = self.config.workers.max(1);

        let mut frontier: VecDeque<CrawlTask> = VecDeque::new();
        if self.visited.check_and_insert(&utils::normalize_url(&seed)) {
            frontier.push_back(CrawlTask {
                url: seed.to_string(),
                depth: 0,
            });
        }

        let mut in_flight = FuturesUnordered::new();
        let mut abort_handles: Vec<AbortHandle> = Vec::new();
        let mut results: Vec<PageResult> = Vec::new();

        loop {
            while !stop.is_stopped() && in_flight.len() < workers {
                let Some(task) = frontier.pop_front() else {
                    break;
                };
                self.progress.inc_length(1);
                let handle = task::spawn(fetch_page(
                    self.client.clone(),
                    task.clone(),
                    Arc::clone(&origin),
                    self.pause(),
                ));
                abort_handles.push(handle.abort_handle());
                in_flight.push(async move { (task, handle.await) });
            }

            if in_flight.is_empty() {
                break;
            }

            let next = tokio::select! {
                _ = stop.stopped() => {
                    info!("crawl stop requested, abandoning in-flight pages");
                    break;
                }
                next = tokio::time::timeout(self.config.inactivity_timeout, in_flight.next()) => next,
            };

            let (task, joined) = match next {
                Ok(Some(done)) => done,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = in_flight.len(),
                        window = ?self.config.inactivity_timeout,
                        "no crawl task completed within the inactivity window, stopping"
                    );
                    break;
                }
            };

            let page = match joined {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = %task.url, error = %e, "crawl worker failed");
                    PageResult::failed(&task, None, format!("worker failed: {e}"))
                }
            };

            self.progress.inc(1);
            self.progress.set_message(page.url.clone());
            if let PageOutcome::Error(reason) = &page.outcome {
                debug!(url = %page.url, reason = %reason, "page error");
            }

            if page.is_ok() && page.depth < self.config.max_depth {
                for link in &page.links {
                    let Ok(parsed) = Url::parse(link) else {
                        continue;
                    };
                    if self.visited.check_and_insert(&utils::normalize_url(&parsed)) {
                        frontier.push_back(CrawlTask {
                            url: link.clone(),
                            depth: page.depth + 1,
                        });
                    }
                }
            }
            results.push(page);
        }

        for handle in abort_handles {
            handle.abort();
        }

        info!(
            pages = results.len(),
            unvisited = frontier.len(),
            "crawl finished"
        );
        Ok(results)
    }

    fn pause(&self) -> Duration {
        let jitter = self.config.jitter.as_millis() as u64;
        if jitter == 0 {
            return self.config.request_delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter);
        self.config.request_delay + Duration::from_millis(extra)
    }
}

async fn fetch_page(
    client: HttpClient,
    task: CrawlTask,
    origin: Arc<Url>,
    pause: Duration,
) -> PageResult {
    if !utils::is_valid_http_url(&task.url) {
        return PageResult::failed(&task, None, "Invalid URL format");
    }
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }

    let resp = match client.get(&task.url).await {
        Ok(resp) => resp,
        Err(e) => return PageResult::failed(&task, None, e.reason()),
    };

    if resp.status == 404 {
        info!(url = %task.url, html = resp.is_html(), "broken link");
        return PageResult::failed(&task, Some(404), "404 Not Found");
    }
    if resp.status >= 400 {
        return PageResult::failed(&task, Some(resp.status), format!("{} Error", resp.status));
    }

    let page_url = match Url::parse(&resp.url) {
        Ok(url) => url,
        Err(_) => return PageResult::failed(&task, Some(resp.status), "Invalid URL format"),
    };
    if !utils::same_origin(&page_url, &origin) {
        debug!(url = %task.url, landed = %page_url, "redirected off origin");
        return PageResult::skipped(&task, Some(resp.status));
    }
    if !resp.is_html() {
        debug!(url = %task.url, content_type = ?resp.content_type(), "not html");
        return PageResult::skipped(&task, Some(resp.status));
    }

    let extracted = extract::extract_page(&page_url, &resp.text(), &origin);
    PageResult {
        url: task.url,
        depth: task.depth,
        status: Some(resp.status),
        links: extracted.links,
        forms: extracted.forms,
        outcome: PageOutcome::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_signature_ignores_defaults() {
        let a = Form {
            action: "http://h/login".to_string(),
            method: "POST".to_string(),
            inputs: vec![FormInput {
                name: Some("user".to_string()),
                input_type: "text".to_string(),
                default_value: "a".to_string(),
            }],
        };
        let mut b = a.clone();
        b.inputs[0].default_value = "b".to_string();
        assert_eq!(a.signature(), b.signature());
    }

    #[tokio::test]
    async fn invalid_seed_is_rejected() {
        let client = HttpClient::new(&crate::http::ClientConfig::crawler(Duration::from_secs(1)))
            .unwrap();
        let crawler = Crawler::new(client, CrawlConfig::default());
        let err = crawler
            .crawl("javascript:alert(1)", &StopSignal::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::InvalidSeed { .. }));
    }

    #[tokio::test]
    async fn stopped_crawl_returns_nothing() {
        let client = HttpClient::new(&crate::http::ClientConfig::crawler(Duration::from_secs(1)))
            .unwrap();
        let crawler = Crawler::new(client, CrawlConfig::default());
        let stop = StopSignal::new();
        stop.stop();
        let pages = crawler.crawl("http://127.0.0.1:9/", &stop).await.unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn pause_without_jitter_is_fixed() {
        let client = HttpClient::new(&crate::http::ClientConfig::crawler(Duration::from_secs(1)))
            .unwrap();
        let crawler = Crawler::new(
            client,
            CrawlConfig {
                request_delay: Duration::from_millis(250),
                ..CrawlConfig::default()
            },
        );
        assert_eq!(crawler.pause(), Duration::from_millis(250));
    }
}
