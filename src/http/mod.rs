use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use moka::future::Cache;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; rv:102.0) Gecko/20100101 Firefox/102.0";
pub const PROBER_USER_AGENT: &str = "Thunderscan/3.0";

/// Statuses that are retried with backoff before the response is surfaced.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {source}")]
    Build {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    Proxy {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid header: {name}")]
    InvalidHeader { name: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    pub fn is_timeout(&self) -> bool {
        match self {
            HttpError::Request { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Short reason suitable for a per-page outcome.
    pub fn reason(&self) -> String {
        match self {
            HttpError::Request { source, .. } if source.is_timeout() => {
                "Request timed out".to_string()
            }
            HttpError::Request { source, .. } if source.is_connect() => {
                "Connection failed".to_string()
            }
            HttpError::Request { source, .. } => format!("Request failed: {source}"),
            other => other.to_string(),
        }
    }
}

/// Fixed request identity each engine presents to the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Crawler,
    Prober,
    Injector { forwarded_for: String },
}

impl Identity {
    pub fn injector() -> Self {
        let octet: u8 = rand::thread_rng().gen_range(1..=255);
        Identity::Injector {
            forwarded_for: format!("127.0.0.{octet}"),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            Identity::Crawler => {
                headers.insert(
                    reqwest::header::USER_AGENT,
                    HeaderValue::from_static(BROWSER_USER_AGENT),
                );
                headers.insert(
                    reqwest::header::ACCEPT_LANGUAGE,
                    HeaderValue::from_static("en-US,en;q=0.5"),
                );
            }
            Identity::Prober => {
                headers.insert(
                    reqwest::header::USER_AGENT,
                    HeaderValue::from_static(PROBER_USER_AGENT),
                );
            }
            Identity::Injector { forwarded_for } => {
                headers.insert(
                    reqwest::header::USER_AGENT,
                    HeaderValue::from_static(BROWSER_USER_AGENT),
                );
                if let Ok(value) = HeaderValue::from_str(forwarded_for) {
                    headers.insert(HeaderName::from_static("x-forwarded-for"), value);
                }
            }
        }
        headers
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub capacity: u64,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub identity: Identity,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub cache: Option<CacheConfig>,
    pub pool_size: usize,
    pub proxy: Option<String>,
    pub extra_header: Option<(String, String)>,
}

impl ClientConfig {
    pub fn new(identity: Identity, timeout: Duration) -> Self {
        Self {
            identity,
            timeout,
            follow_redirects: false,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            cache: None,
            pool_size: 20,
            proxy: None,
            extra_header: None,
        }
    }

    /// Redirect-following, cached client used for crawling.
    pub fn crawler(timeout: Duration) -> Self {
        Self {
            follow_redirects: true,
            cache: Some(CacheConfig::default()),
            ..Self::new(Identity::Crawler, timeout)
        }
    }

    pub fn prober(timeout: Duration) -> Self {
        Self::new(Identity::Prober, timeout)
    }

    pub fn injector(timeout: Duration) -> Self {
        Self::new(Identity::injector(), timeout)
    }
}

/// A fully read response. Header names are lower-cased.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

impl HttpResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Body as UTF-8, or `None` when it does not decode.
    pub fn utf8_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Request body attached by [`HttpClient::send`].
#[derive(Clone, Copy, Debug)]
pub enum Body<'a> {
    Empty,
    Form(&'a [(String, String)]),
}

pub fn header_map_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(headers.len());
    for (k, v) in headers.iter() {
        if let Ok(v) = v.to_str() {
            out.insert(k.as_str().to_lowercase(), v.to_string());
        }
    }
    out
}

/// Pooled HTTP client with retry, optional response cache and a fixed identity.
///
/// Cloning shares the connection pool and the cache.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    cache: Option<Cache<String, HttpResponse>>,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, HttpError> {
        let mut headers = config.identity.headers();
        if let Some((name, value)) = config.extra_header.as_ref() {
            let key = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| {
                HttpError::InvalidHeader {
                    name: name.to_string(),
                }
            })?;
            let value =
                HeaderValue::from_str(value.trim()).map_err(|_| HttpError::InvalidHeader {
                    name: name.to_string(),
                })?;
            headers.insert(key, value);
        }

        let redirect_policy = if config.follow_redirects {
            reqwest::redirect::Policy::limited(5)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(redirect_policy)
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_size.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .danger_accept_invalid_hostnames(true)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy_cfg = reqwest::Proxy::all(proxy).map_err(|e| HttpError::Proxy {
                proxy: proxy.to_string(),
                source: e,
            })?;
            builder = builder.proxy(proxy_cfg);
        }

        let client = builder
            .build()
            .map_err(|e| HttpError::Build { source: e })?;

        let cache = config.cache.map(|c| {
            Cache::builder()
                .max_capacity(c.capacity)
                .time_to_live(c.ttl)
                .build()
        });

        Ok(Self {
            client,
            cache,
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.send(Method::GET, url, Body::Empty, None).await
    }

    pub async fn head(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.send(Method::HEAD, url, Body::Empty, None).await
    }

    /// Sends one logical request, retrying retryable statuses and failed
    /// connection attempts with exponential backoff. Timeouts are not retried.
    /// Once retries run out the last response is returned as-is.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Body<'_>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpError> {
        let cache_key = match (&self.cache, &method, body) {
            (Some(_), m, Body::Empty) if *m == Method::GET || *m == Method::HEAD => {
                Some(format!("{m} {url}"))
            }
            _ => None,
        };
        if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key.as_ref()) {
            if let Some(hit) = cache.get(key).await {
                return Ok(hit);
            }
        }

        let mut attempt = 0u32;
        loop {
            let mut request = self.client.request(method.clone(), url);
            if let Body::Form(fields) = body {
                request = request.form(fields);
            }
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let started = Instant::now();
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if RETRY_STATUSES.contains(&status) && attempt < self.max_retries {
                        attempt += 1;
                        debug!(url, status, attempt, "retryable status, backing off");
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    let final_url = resp.url().to_string();
                    let headers = header_map_to_hashmap(resp.headers());
                    let body = resp.bytes().await.map_err(|e| HttpError::Request {
                        url: url.to_string(),
                        source: e,
                    })?;
                    let response = HttpResponse {
                        url: final_url,
                        status,
                        headers,
                        body: body.to_vec(),
                        elapsed: started.elapsed(),
                    };
                    if let (Some(cache), Some(key)) = (self.cache.as_ref(), cache_key) {
                        if !RETRY_STATUSES.contains(&status) {
                            cache.insert(key, response.clone()).await;
                        }
                    }
                    return Ok(response);
                }
                Err(e) if e.is_connect() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(url, attempt, error = %e, "connection failed, backing off");
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(e) => {
                    return Err(HttpError::Request {
                        url: url.to_string(),
                        source: e,
                    })
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}
