pub mod baseline;
pub mod signals;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use rand::Rng;
use reqwest::Method;
use serde::Serialize;
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, warn};
use url::Url;

use crate::crawler::Form;
use crate::http::{Body, HttpClient, HttpError, HttpResponse};
use crate::stop::StopSignal;

use baseline::{Baseline, BaselineCache, BaselineKey};

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_TIME_THRESHOLD: Duration = Duration::from_secs(10);
pub const DEFAULT_SIMILARITY_CUTOFF: f64 = 0.7;

/// Input names whose value is submitted untouched so the request stays valid.
const CSRF_FIELD_NAMES: [&str; 4] = ["csrf", "token", "csrf_token", "authenticity_token"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid base URL: {url}")]
    InvalidBaseUrl { url: String },
}

#[derive(Clone, Debug)]
pub struct InjectionConfig {
    /// Minimum response delay that counts as a time-based hit.
    pub time_threshold: Duration,
    pub workers: usize,
    pub similarity_cutoff: f64,
    /// Random pause before each test request, drawn from `[min, max]`.
    pub throttle: (Duration, Duration),
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            time_threshold: DEFAULT_TIME_THRESHOLD,
            workers: DEFAULT_WORKERS,
            similarity_cutoff: DEFAULT_SIMILARITY_CUTOFF,
            throttle: (Duration::from_millis(500), Duration::from_millis(1500)),
        }
    }
}

impl InjectionConfig {
    /// Test requests must be allowed to outlive the time threshold.
    pub fn request_timeout(&self) -> Duration {
        std::cmp::max(
            self.time_threshold.saturating_mul(2),
            self.time_threshold + Duration::from_secs(5),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Detection {
    TimeBased { elapsed_secs: f64 },
    Boolean { similarity: f64 },
    Error { signature: String },
    ContentChange { change: String },
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detection::TimeBased { elapsed_secs } => write!(f, "Time-based ({elapsed_secs:.2}s)"),
            Detection::Boolean { similarity } => write!(f, "Boolean (Similarity: {similarity:.2})"),
            Detection::Error { signature } => write!(f, "Error: {signature}"),
            Detection::ContentChange { change } => write!(f, "Content change: {change}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPoint {
    Query,
    Form,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Vulnerability {
    #[serde(rename = "type")]
    pub kind: String,
    pub point: InjectionPoint,
    pub parameter: String,
    pub payload: String,
    pub detection_methods: Vec<Detection>,
    pub url: String,
    pub http_method: String,
    pub status: u16,
    pub length: usize,
}

impl Vulnerability {
    pub fn methods_label(&self) -> String {
        self.detection_methods
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Clone, Debug)]
struct QueryParam {
    index: usize,
    name: String,
    value: String,
}

#[derive(Clone, Debug)]
enum Job {
    Query {
        param: Arc<QueryParam>,
        payload: Arc<str>,
    },
    Form {
        form: Arc<Form>,
        payload: Arc<str>,
    },
}

#[derive(Clone)]
struct ScanContext {
    client: HttpClient,
    config: InjectionConfig,
    base: Arc<Url>,
    baselines: Arc<BaselineCache>,
    findings: Arc<Mutex<Vec<Vulnerability>>>,
    progress: ProgressBar,
    stop: StopSignal,
}

/// SQL injection tester for query parameters and HTML forms.
pub struct InjectionTester {
    client: HttpClient,
    config: InjectionConfig,
    progress: ProgressBar,
}

impl InjectionTester {
    pub fn new(client: HttpClient, config: InjectionConfig) -> Self {
        Self {
            client,
            config,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Number of (target, payload) pairs a scan of `base_url` and `forms` runs.
    pub fn planned_jobs(&self, base_url: &str, forms: &[Form], payloads: &[String]) -> u64 {
        let params = Url::parse(base_url)
            .map(|u| u.query_pairs().count())
            .unwrap_or(0);
        let forms = forms.iter().filter(|f| has_injectable_input(f)).count();
        ((params + forms) * payloads.len()) as u64
    }

    /// Tests every query parameter of `base_url` and every form with every
    /// payload. Each (target, payload) pair yields at most one finding.
    pub async fn scan(
        &self,
        base_url: &str,
        forms: &[Form],
        payloads: &[String],
        stop: &StopSignal,
    ) -> Result<Vec<Vulnerability>, ScanError> {
        let base = Url::parse(base_url).map_err(|_| ScanError::InvalidBaseUrl {
            url: base_url.to_string(),
        })?;

        let params: Vec<Arc<QueryParam>> = base
            .query_pairs()
            .enumerate()
            .map(|(index, (name, value))| {
                Arc::new(QueryParam {
                    index,
                    name: name.into_owned(),
                    value: value.into_owned(),
                })
            })
            .collect();
        let payloads: Vec<Arc<str>> = payloads.iter().map(|p| Arc::from(p.as_str())).collect();

        let mut jobs: Vec<Job> = Vec::new();
        for param in &params {
            for payload in &payloads {
                jobs.push(Job::Query {
                    param: Arc::clone(param),
                    payload: Arc::clone(payload),
                });
            }
        }
        for form in forms.iter().filter(|f| has_injectable_input(f)) {
            let form = Arc::new(form.clone());
            for payload in &payloads {
                jobs.push(Job::Form {
                    form: Arc::clone(&form),
                    payload: Arc::clone(payload),
                });
            }
        }

        self.progress.set_length(jobs.len() as u64);
        info!(
            base_url,
            params = params.len(),
            forms = forms.len(),
            jobs = jobs.len(),
            "injection scan started"
        );

        let ctx = ScanContext {
            client: self.client.clone(),
            config: self.config.clone(),
            base: Arc::new(base),
            baselines: Arc::new(BaselineCache::new()),
            findings: Arc::new(Mutex::new(Vec::new())),
            progress: self.progress.clone(),
            stop: stop.clone(),
        };

        let mut running = stream::iter(jobs)
            .map(|job| task::spawn(run_job(ctx.clone(), job)))
            .buffer_unordered(self.config.workers.max(1));
        while let Some(joined) = running.next().await {
            if let Err(e) = joined {
                warn!(error = %e, "injection worker failed");
            }
        }

        let findings = match ctx.findings.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        info!(
            found = findings.len(),
            baselines = ctx.baselines.fetch_count(),
            "injection scan finished"
        );
        Ok(findings)
    }
}

async fn run_job(ctx: ScanContext, job: Job) {
    if ctx.stop.is_stopped() {
        return;
    }
    throttle(&ctx.config).await;
    if ctx.stop.is_stopped() {
        return;
    }

    let found = match &job {
        Job::Query { param, payload } => test_parameter(&ctx, param, payload).await,
        Job::Form { form, payload } => test_form(&ctx, form, payload).await,
    };
    ctx.progress.inc(1);

    if let Some(vuln) = found {
        ctx.progress.println(format!(
            "{} {} {} {} {}",
            "[SQLi]".bold().red(),
            vuln.url.bold().blue(),
            format!("param={}", vuln.parameter).white(),
            format!("payload={}", vuln.payload).yellow(),
            vuln.methods_label().green(),
        ));
        let mut findings = match ctx.findings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        findings.push(vuln);
    }
}

async fn throttle(config: &InjectionConfig) {
    let (min, max) = config.throttle;
    if max.is_zero() {
        return;
    }
    let pause = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    tokio::time::sleep(pause).await;
}

async fn fetch_baseline(
    client: &HttpClient,
    method: Method,
    url: &str,
    body: Body<'_>,
    timeout: Duration,
) -> Result<Baseline, HttpError> {
    let resp = client.send(method, url, body, Some(timeout)).await?;
    Ok(Baseline::from_response(&resp))
}

async fn test_parameter(
    ctx: &ScanContext,
    param: &QueryParam,
    payload: &str,
) -> Option<Vulnerability> {
    let timeout = ctx.config.request_timeout();
    let base_url = ctx.base.as_str();
    let baseline = ctx
        .baselines
        .get_or_fetch(BaselineKey::Parameter(param.name.clone()), || {
            fetch_baseline(&ctx.client, Method::GET, base_url, Body::Empty, timeout)
        })
        .await;
    let baseline = match baseline {
        Ok(baseline) => baseline,
        Err(e) => {
            debug!(param = %param.name, error = %e, "baseline unavailable");
            return None;
        }
    };

    let test_url = inject_query(&ctx.base, param.index, &format!("{}{payload}", param.value));
    let resp = match ctx
        .client
        .send(Method::GET, &test_url, Body::Empty, Some(timeout))
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            debug!(url = %test_url, payload, error = %e, "test request failed");
            return None;
        }
    };

    let text = resp.text();
    let mut detections = Vec::new();
    if let Some(d) = timing_signal(&ctx.config, payload, &resp) {
        detections.push(d);
    }
    let similarity = signals::similarity_ratio(&baseline.body, &text);
    if similarity < ctx.config.similarity_cutoff {
        detections.push(Detection::Boolean { similarity });
    }
    if let Some(signature) = signals::match_error_signature(&text) {
        detections.push(Detection::Error {
            signature: signature.to_string(),
        });
    }
    if let Some(change) = baseline.shape.change_from(&signals::PageShape::of(&text)) {
        detections.push(Detection::ContentChange { change });
    }
    if detections.is_empty() {
        return None;
    }

    Some(Vulnerability {
        kind: "SQL Injection".to_string(),
        point: InjectionPoint::Query,
        parameter: param.name.clone(),
        payload: payload.to_string(),
        detection_methods: detections,
        url: test_url,
        http_method: Method::GET.to_string(),
        status: resp.status,
        length: resp.len(),
    })
}

async fn test_form(ctx: &ScanContext, form: &Form, payload: &str) -> Option<Vulnerability> {
    let timeout = ctx.config.request_timeout();
    let method = form_method(&form.method);

    let control_fields = form_fields(form, None);
    let control_key = BaselineKey::Control(format!("{} {}", method, form.action));
    let control = ctx
        .baselines
        .get_or_fetch(control_key, || async {
            let resp = submit_form(&ctx.client, &method, &form.action, &control_fields, timeout)
                .await?;
            Ok(Baseline::from_response(&resp))
        })
        .await;
    let control = match control {
        Ok(control) => control,
        Err(e) => {
            debug!(action = %form.action, error = %e, "form control unavailable");
            return None;
        }
    };

    let fields = form_fields(form, Some(payload));
    let resp = match submit_form(&ctx.client, &method, &form.action, &fields, timeout).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(action = %form.action, payload, error = %e, "form submission failed");
            return None;
        }
    };

    let text = resp.text();
    let mut detections = Vec::new();
    if let Some(d) = timing_signal(&ctx.config, payload, &resp) {
        detections.push(d);
    }
    if let Some(signature) = signals::match_error_signature(&text) {
        detections.push(Detection::Error {
            signature: signature.to_string(),
        });
    }
    if let Some(change) = control.shape.change_from(&signals::PageShape::of(&text)) {
        detections.push(Detection::ContentChange { change });
    }
    if detections.is_empty() {
        return None;
    }

    let injected: Vec<&str> = form
        .inputs
        .iter()
        .filter_map(|i| i.name.as_deref())
        .filter(|n| !is_csrf_field(n))
        .collect();
    Some(Vulnerability {
        kind: "SQL Injection".to_string(),
        point: InjectionPoint::Form,
        parameter: injected.join(", "),
        payload: payload.to_string(),
        detection_methods: detections,
        url: form.action.clone(),
        http_method: method.to_string(),
        status: resp.status,
        length: resp.len(),
    })
}

fn timing_signal(config: &InjectionConfig, payload: &str, resp: &HttpResponse) -> Option<Detection> {
    if signals::is_time_based(payload) && resp.elapsed >= config.time_threshold {
        Some(Detection::TimeBased {
            elapsed_secs: resp.elapsed.as_secs_f64(),
        })
    } else {
        None
    }
}

/// Rebuilds the query of `base` with the value at `index` replaced.
fn inject_query(base: &Url, index: usize, value: &str) -> String {
    let pairs: Vec<(String, String)> = base.query_pairs().into_owned().collect();
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (i, (k, v)) in pairs.iter().enumerate() {
            if i == index {
                query.append_pair(k, value);
            } else {
                query.append_pair(k, v);
            }
        }
    }
    url.to_string()
}

pub fn is_csrf_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    CSRF_FIELD_NAMES.contains(&lower.as_str()) || lower.contains("csrf")
}

/// A form is only worth testing when a payload lands in at least one field.
fn has_injectable_input(form: &Form) -> bool {
    form.inputs
        .iter()
        .filter_map(|i| i.name.as_deref())
        .any(|n| !is_csrf_field(n))
}

/// Named inputs with their submitted values. With a payload, every
/// non-CSRF input gets `default + payload`.
fn form_fields(form: &Form, payload: Option<&str>) -> Vec<(String, String)> {
    form.inputs
        .iter()
        .filter_map(|input| {
            let name = input.name.as_ref()?;
            let value = match payload {
                Some(p) if !is_csrf_field(name) => format!("{}{p}", input.default_value),
                _ => input.default_value.clone(),
            };
            Some((name.clone(), value))
        })
        .collect()
}

fn form_method(raw: &str) -> Method {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes()).unwrap_or(Method::GET)
}

async fn submit_form(
    client: &HttpClient,
    method: &Method,
    action: &str,
    fields: &[(String, String)],
    timeout: Duration,
) -> Result<HttpResponse, HttpError> {
    if *method == Method::GET {
        let url = match Url::parse(action) {
            Ok(mut url) => {
                url.query_pairs_mut().extend_pairs(fields.iter());
                url.to_string()
            }
            Err(_) => action.to_string(),
        };
        client
            .send(Method::GET, &url, Body::Empty, Some(timeout))
            .await
    } else {
        client
            .send(method.clone(), action, Body::Form(fields), Some(timeout))
            .await
    }
}
