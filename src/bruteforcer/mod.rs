pub mod classify;
pub mod filters;

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use governor::{Quota, RateLimiter};
use indicatif::ProgressBar;
use itertools::iproduct;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, info, warn};

use crate::http::HttpClient;
use crate::stop::StopSignal;
use crate::utils;

pub use classify::{Classifier, Verdict, DEFAULT_MIN_LENGTH, INTERESTING_STATUSES};
pub use filters::ResultFilter;

pub const DEFAULT_WORKERS: usize = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub url: String,
    pub status: u16,
    pub length: usize,
    /// Headers of the confirming GET, names lower-cased.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Suffixes appended to every entry; `""` probes the bare entry.
    pub extensions: Vec<String>,
    pub workers: usize,
    /// Dispatch rate in candidates per second.
    pub rate: u32,
    pub statuses: HashSet<u16>,
    pub min_length: usize,
    pub filter: ResultFilter,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            extensions: utils::default_extensions(),
            workers: DEFAULT_WORKERS,
            rate: 1000,
            statuses: INTERESTING_STATUSES.into_iter().collect(),
            min_length: DEFAULT_MIN_LENGTH,
            filter: ResultFilter::default(),
        }
    }
}

// one candidate path with its case variants, tried in order
#[derive(Clone, Debug)]
struct ProbeJob {
    variants: Vec<String>,
}

#[derive(Clone)]
struct WorkerContext {
    client: HttpClient,
    classifier: Arc<Classifier>,
    progress: ProgressBar,
    stop: StopSignal,
}

/// Wordlist prober: every entry × extension × case variant under a base URL.
pub struct Prober {
    client: HttpClient,
    config: ProbeConfig,
    classifier: Arc<Classifier>,
    progress: ProgressBar,
}

impl Prober {
    pub fn new(client: HttpClient, config: ProbeConfig) -> Self {
        let classifier = Arc::new(Classifier::new(
            config.statuses.clone(),
            config.min_length,
        ));
        Self {
            client,
            config,
            classifier,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Number of requests-worth of variants a probe over `entries` schedules.
    pub fn planned_variants(&self, entries: &[String]) -> u64 {
        candidates(entries, &self.config.extensions)
            .iter()
            .map(|c| utils::case_variants(c).len() as u64)
            .sum()
    }

    pub async fn probe(
        &self,
        base_url: &str,
        entries: &[String],
        stop: &StopSignal,
    ) -> Vec<ProbeResult> {
        let jobs: Vec<ProbeJob> = candidates(entries, &self.config.extensions)
            .into_iter()
            .map(|c| ProbeJob {
                variants: utils::case_variants(&c)
                    .into_iter()
                    .map(|v| utils::join_candidate(base_url, &v))
                    .collect(),
            })
            .collect();
        let total: u64 = jobs.iter().map(|j| j.variants.len() as u64).sum();
        self.progress.set_length(total);
        info!(base_url, candidates = jobs.len(), variants = total, "probe started");

        let ctx = WorkerContext {
            client: self.client.clone(),
            classifier: Arc::clone(&self.classifier),
            progress: self.progress.clone(),
            stop: stop.clone(),
        };

        let worker_count = self.config.workers.max(1);
        let (result_tx, mut result_rx) = mpsc::channel::<ProbeResult>(1024);
        let mut worker_txs = Vec::with_capacity(worker_count);
        let mut workers = FuturesUnordered::new();
        for _ in 0..worker_count {
            let (tx, rx) = mpsc::channel::<ProbeJob>(256);
            worker_txs.push(tx);
            workers.push(task::spawn(run_worker(ctx.clone(), rx, result_tx.clone())));
        }
        drop(result_tx);

        let dispatcher = task::spawn(dispatch_jobs(
            jobs,
            worker_txs,
            self.config.rate,
            stop.clone(),
        ));

        let mut results = Vec::new();
        while let Some(found) = result_rx.recv().await {
            results.push(found);
        }

        if let Err(e) = dispatcher.await {
            warn!(error = %e, "probe dispatcher failed");
        }
        while let Some(joined) = workers.next().await {
            if let Err(e) = joined {
                warn!(error = %e, "probe worker failed");
            }
        }

        let results = self.config.filter.finalize(results);
        info!(base_url, found = results.len(), "probe finished");
        results
    }
}

fn candidates(entries: &[String], extensions: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (entry, ext) in iproduct!(entries.iter(), extensions.iter()) {
        let entry = entry.trim().trim_start_matches('/');
        if entry.is_empty() {
            continue;
        }
        let candidate = format!("{entry}{ext}");
        if seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    }
    out
}

async fn dispatch_jobs(
    jobs: Vec<ProbeJob>,
    worker_txs: Vec<mpsc::Sender<ProbeJob>>,
    rate: u32,
    stop: StopSignal,
) {
    let lim = RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN),
    ));
    if worker_txs.is_empty() {
        return;
    }
    for (idx, job) in jobs.into_iter().enumerate() {
        if stop.is_stopped() {
            debug!("probe stop requested, dispatch halted");
            break;
        }
        lim.until_ready().await;
        let tx = &worker_txs[idx % worker_txs.len()];
        if tx.send(job).await.is_err() {
            continue;
        }
    }
}

async fn run_worker(
    ctx: WorkerContext,
    mut rx: mpsc::Receiver<ProbeJob>,
    tx: mpsc::Sender<ProbeResult>,
) {
    while let Some(job) = rx.recv().await {
        if ctx.stop.is_stopped() {
            continue;
        }
        let Some(found) = probe_job(&ctx, &job).await else {
            continue;
        };
        ctx.progress.println(format!(
            "{} {} {} {}",
            "::".bold().white(),
            format!("[{}]", found.status).bold().green(),
            found.url.bold().blue(),
            format!("[size: {}]", found.length).white(),
        ));
        if tx.send(found).await.is_err() {
            break;
        }
    }
}

// tries variants in order and stops at the first interesting one
async fn probe_job(ctx: &WorkerContext, job: &ProbeJob) -> Option<ProbeResult> {
    for (tried, url) in job.variants.iter().enumerate() {
        if ctx.stop.is_stopped() {
            return None;
        }
        ctx.progress.inc(1);
        ctx.progress.set_message(format!(
            "{} {}",
            "probing ::".bold().white(),
            url.bold().blue()
        ));
        if let Some(found) = probe_variant(ctx, url).await {
            // the remaining spellings are settled without a request
            ctx.progress.inc((job.variants.len() - tried - 1) as u64);
            return Some(found);
        }
    }
    None
}

async fn probe_variant(ctx: &WorkerContext, url: &str) -> Option<ProbeResult> {
    let head = match ctx.client.head(url).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(url, error = %e, "head failed");
            return None;
        }
    };
    // HEAD has no body to classify, so anything possibly interesting needs a GET
    let needs_get = matches!(head.status, 405 | 501)
        || ctx.classifier.status_may_be_interesting(head.status);
    if !needs_get {
        return None;
    }

    let resp = match ctx.client.get(url).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(url, error = %e, "get failed");
            return None;
        }
    };
    match ctx.classifier.classify(&resp) {
        Verdict::Interesting => Some(ProbeResult {
            url: url.to_string(),
            status: resp.status,
            length: resp.len(),
            headers: resp.headers.clone(),
        }),
        verdict => {
            debug!(url, status = resp.status, ?verdict, "not interesting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_cross_entries_and_extensions() {
        let out = candidates(
            &["admin".to_string(), "/login".to_string(), " ".to_string()],
            &utils::default_extensions(),
        );
        assert_eq!(
            out,
            vec![
                "admin",
                "admin.php",
                "admin.html",
                "login",
                "login.php",
                "login.html"
            ]
        );
    }

    #[test]
    fn planned_variants_counts_case_spellings() {
        let client =
            HttpClient::new(&crate::http::ClientConfig::prober(DEFAULT_TIMEOUT)).unwrap();
        let prober = Prober::new(
            client,
            ProbeConfig {
                extensions: vec![String::new()],
                ..ProbeConfig::default()
            },
        );
        // "Admin" -> Admin, ADMIN, admin; "api" -> api, API; "42" -> 42
        let n = prober.planned_variants(&["Admin".to_string(), "api".to_string(), "42".to_string()]);
        assert_eq!(n, 6);
    }
}
