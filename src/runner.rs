use std::collections::HashSet;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::time::Instant;
use tracing::info;

use crate::bruteforcer::{ProbeConfig, ProbeResult, Prober};
use crate::crawler::{CrawlConfig, CrawlError, Crawler, Form, PageResult};
use crate::detector::{InjectionConfig, InjectionTester, ScanError, Vulnerability};
use crate::http::{ClientConfig, HttpClient, HttpError, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};
use crate::stop::StopSignal;
use crate::utils;

pub const DEFAULT_WORDLIST: &str = "wordlists/common.txt";
pub const DEFAULT_PAYLOADS: &str = "wordlists/sql_payloads.txt";

#[derive(Clone, Debug)]
pub enum PayloadSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub enum WordlistSource {
    FilePath(String),
    Inline(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Options {
    pub target: String,
    pub wordlist: WordlistSource,
    pub payloads: PayloadSource,
    pub crawl: CrawlConfig,
    pub probe: ProbeConfig,
    pub inject: InjectionConfig,
    pub crawl_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub skip_crawl: bool,
    pub skip_probe: bool,
    pub skip_inject: bool,
    pub show_progress: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            target: String::new(),
            wordlist: WordlistSource::FilePath(DEFAULT_WORDLIST.to_string()),
            payloads: PayloadSource::FilePath(DEFAULT_PAYLOADS.to_string()),
            crawl: CrawlConfig {
                request_delay: Duration::from_secs(1),
                ..CrawlConfig::default()
            },
            probe: ProbeConfig::default(),
            inject: InjectionConfig::default(),
            crawl_timeout: Duration::from_secs(10),
            probe_timeout: crate::bruteforcer::DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            proxy: None,
            header: None,
            skip_crawl: false,
            skip_probe: false,
            skip_inject: false,
            show_progress: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no target URL provided")]
    MissingTarget,

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("payloads list is empty")]
    EmptyPayloads,

    #[error("wordlist is empty")]
    EmptyWordlist,

    #[error("invalid option: {message}")]
    InvalidOption { message: String },

    #[error("failed to open file for {kind}: {path}: {source}")]
    FileOpen {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read lines for {kind}: {path}: {source}")]
    FileRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: HttpError,
    },

    #[error("crawl failed: {source}")]
    Crawl {
        #[from]
        source: CrawlError,
    },

    #[error("injection scan failed: {source}")]
    Scan {
        #[from]
        source: ScanError,
    },
}

#[derive(Clone, Debug)]
pub struct ScanResult {
    pub started_at: Instant,
    pub elapsed: Duration,
    pub pages: Vec<PageResult>,
    pub forms: Vec<Form>,
    pub resources: Vec<ProbeResult>,
    pub vulnerabilities: Vec<Vulnerability>,
    /// Set when the scan was cut short by a stop request.
    pub interrupted: bool,
}

impl ScanResult {
    pub fn pages_ok(&self) -> usize {
        self.pages.iter().filter(|p| p.is_ok()).count()
    }
}

/// Runs crawl, content probing and injection testing against one target.
#[derive(Clone, Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        let target = options.target.trim();
        if target.is_empty() {
            return Err(RunnerError::MissingTarget);
        }
        if !utils::is_valid_http_url(target) {
            return Err(RunnerError::InvalidUrl {
                url: target.to_string(),
            });
        }
        let cutoff = options.inject.similarity_cutoff;
        if cutoff.is_nan() || cutoff <= 0.0 || cutoff > 1.0 {
            return Err(RunnerError::InvalidOption {
                message: format!("similarity cutoff {cutoff} must be in (0, 1]"),
            });
        }
        if options.inject.time_threshold.is_zero() {
            return Err(RunnerError::InvalidOption {
                message: "time threshold must be positive".to_string(),
            });
        }
        if options.probe.extensions.is_empty() {
            return Err(RunnerError::InvalidOption {
                message: "extension list must not be empty".to_string(),
            });
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub async fn run(&self, stop: &StopSignal) -> Result<ScanResult, RunnerError> {
        let started_at = Instant::now();
        let opts = &self.options;
        let target = opts.target.trim();

        // inputs are read up front so a bad path fails before any traffic
        let payloads = if opts.skip_inject {
            Vec::new()
        } else {
            let payloads = load_payloads(&opts.payloads).await?;
            if payloads.is_empty() {
                return Err(RunnerError::EmptyPayloads);
            }
            payloads
        };
        let words = if opts.skip_probe {
            Vec::new()
        } else {
            let words = load_wordlist(&opts.wordlist).await?;
            if words.is_empty() {
                return Err(RunnerError::EmptyWordlist);
            }
            words
        };

        let pages = if opts.skip_crawl || stop.is_stopped() {
            Vec::new()
        } else {
            let client = self.client(ClientConfig {
                pool_size: opts.crawl.workers,
                ..ClientConfig::crawler(opts.crawl_timeout)
            })?;
            let pb = self.phase_bar("crawl");
            let pages = Crawler::new(client, opts.crawl.clone())
                .with_progress(pb.clone())
                .crawl(target, stop)
                .await?;
            pb.finish_and_clear();
            pages
        };
        let forms = collect_forms(&pages);

        let resources = if opts.skip_probe || stop.is_stopped() {
            Vec::new()
        } else {
            let client = self.client(ClientConfig {
                pool_size: opts.probe.workers,
                ..ClientConfig::prober(opts.probe_timeout)
            })?;
            let pb = self.phase_bar("probe");
            let found = Prober::new(client, opts.probe.clone())
                .with_progress(pb.clone())
                .probe(target, &words, stop)
                .await;
            pb.finish_and_clear();
            found
        };

        let vulnerabilities = if opts.skip_inject || stop.is_stopped() {
            Vec::new()
        } else {
            let client = self.client(ClientConfig {
                pool_size: opts.inject.workers,
                ..ClientConfig::injector(opts.inject.request_timeout())
            })?;
            let pb = self.phase_bar("inject");
            let found = InjectionTester::new(client, opts.inject.clone())
                .with_progress(pb.clone())
                .scan(target, &forms, &payloads, stop)
                .await?;
            pb.finish_and_clear();
            found
        };

        let elapsed = started_at.elapsed();
        info!(
            pages = pages.len(),
            resources = resources.len(),
            vulnerabilities = vulnerabilities.len(),
            elapsed = ?elapsed,
            "scan finished"
        );
        Ok(ScanResult {
            started_at,
            elapsed,
            pages,
            forms,
            resources,
            vulnerabilities,
            interrupted: stop.is_stopped(),
        })
    }

    fn client(&self, config: ClientConfig) -> Result<HttpClient, RunnerError> {
        let extra_header = match self.options.header.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(
                utils::parse_header_line(raw)
                    .map_err(|message| RunnerError::InvalidOption { message })?,
            ),
            _ => None,
        };
        let config = ClientConfig {
            max_retries: self.options.max_retries,
            backoff_base: self.options.backoff_base,
            proxy: self.options.proxy.clone(),
            extra_header,
            ..config
        };
        HttpClient::new(&config).map_err(|e| RunnerError::HttpClientBuild { source: e })
    }

    fn phase_bar(&self, phase: &'static str) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(0);
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.enable_steady_tick(Duration::from_millis(200));
        if let Ok(style) = ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {prefix} :: {msg}",
        ) {
            pb.set_style(style.progress_chars(r#"#>-"#));
        }
        pb.set_prefix(phase);
        pb
    }
}

/// Forms from every successfully crawled page, first occurrence kept.
pub fn collect_forms(pages: &[PageResult]) -> Vec<Form> {
    let mut seen = HashSet::new();
    pages
        .iter()
        .filter(|p| p.is_ok())
        .flat_map(|p| p.forms.iter())
        .filter(|f| seen.insert(f.signature()))
        .cloned()
        .collect()
}

async fn read_lines(
    kind: &'static str,
    path: &str,
    keep: impl Fn(&str) -> bool,
) -> Result<Vec<String>, RunnerError> {
    let path = crate::config::expand_tilde_string(path);
    let handle = File::open(&path).await.map_err(|e| RunnerError::FileOpen {
        kind,
        path: path.clone(),
        source: e,
    })?;
    let mut out = Vec::new();
    let mut lines = BufReader::new(handle).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if keep(line) {
                    out.push(line.to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                return Err(RunnerError::FileRead {
                    kind,
                    path,
                    source: e,
                })
            }
        }
    }
    Ok(out)
}

fn keep_payload(line: &str) -> bool {
    !line.is_empty() && !line.starts_with('#')
}

fn keep_word(line: &str) -> bool {
    !line.is_empty()
}

/// Payload lines, trimmed; blanks and `#` comments dropped.
pub async fn load_payloads(source: &PayloadSource) -> Result<Vec<String>, RunnerError> {
    match source {
        PayloadSource::Inline(values) => Ok(values
            .iter()
            .map(|s| s.trim())
            .filter(|s| keep_payload(s))
            .map(|s| s.to_string())
            .collect()),
        PayloadSource::FilePath(path) => read_lines("payloads", path, keep_payload).await,
    }
}

/// Wordlist lines, trimmed; blanks dropped.
pub async fn load_wordlist(source: &WordlistSource) -> Result<Vec<String>, RunnerError> {
    match source {
        WordlistSource::Inline(values) => Ok(values
            .iter()
            .map(|s| s.trim())
            .filter(|s| keep_word(s))
            .map(|s| s.to_string())
            .collect()),
        WordlistSource::FilePath(path) => read_lines("wordlist", path, keep_word).await,
    }
}
