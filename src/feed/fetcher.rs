use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use super::cache::{CacheEntry, FeedCache};
use super::parser::parse_feed;
use super::types::ParsedFeed;
use crate::util::UrlPolicy;

const MAX_RETRIES: u32 = 3;
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching a single OPML document or feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL rejected before any request was made (bad scheme, private host)
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Fetch exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Where raw document bytes come from.
///
/// The HTTP implementation is [`HttpFeedSource`]; tests substitute an
/// in-memory source to count and script fetches.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

// ============================================================================
// HTTP Source
// ============================================================================

/// Fetches documents over HTTP(S) with retry and size limits.
///
/// - URLs are validated before each request (SSRF guard), and again on
///   every redirect hop
/// - Rate limiting (HTTP 429) and 5xx responses are retried with exponential
///   backoff (2s, 4s, 8s), up to 3 retries
/// - Other non-2xx responses fail immediately with their status
/// - Response bodies are limited to 10MB; truncated bodies are retried
pub struct HttpFeedSource {
    client: reqwest::Client,
    policy: UrlPolicy,
    backoff_base: Duration,
}

/// What to do with a response that did not yield a body.
enum Attempt {
    Retry(FetchError),
    Fail(FetchError),
}

impl HttpFeedSource {
    pub fn new(request_timeout: Duration, policy: UrlPolicy) -> Result<Self, FetchError> {
        // PERF-019: Connection pooling and keepalive for repeated feed hosts
        let client = reqwest::Client::builder()
            .redirect(redirect_policy(policy))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(request_timeout)
            .user_agent(concat!("opml2json/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            policy,
            backoff_base: BACKOFF_BASE,
        })
    }

    /// Overrides the first retry delay (doubled on each further retry).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(retry_count))
    }

    async fn attempt(&self, url: &reqwest::Url) -> Result<Vec<u8>, Attempt> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Attempt::Fail(e.into()))?;
        let status = response.status();

        // EDGE-004: 429 and 5xx are transient
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Retry(FetchError::RateLimited(MAX_RETRIES)));
        }
        if status.is_server_error() {
            return Err(Attempt::Retry(FetchError::HttpStatus(status.as_u16())));
        }
        if !status.is_success() {
            return Err(Attempt::Fail(FetchError::HttpStatus(status.as_u16())));
        }

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => Ok(bytes),
            // EDGE-005: a body cut short of Content-Length is worth another try
            Err(e @ FetchError::IncompleteResponse { .. }) => Err(Attempt::Retry(e)),
            Err(e) => Err(Attempt::Fail(e)),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let validated = self
            .policy
            .check(url)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let mut retry_count = 0;
        loop {
            match self.attempt(&validated).await {
                Ok(bytes) => return Ok(bytes),
                Err(Attempt::Fail(e)) => return Err(e),
                Err(Attempt::Retry(e)) if retry_count >= MAX_RETRIES => return Err(e),
                Err(Attempt::Retry(e)) => {
                    let delay = self.backoff(retry_count);
                    tracing::warn!(
                        url = %url,
                        error = %e,
                        retry = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient fetch failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
            }
        }
    }
}

/// Redirect policy with a hop limit, loop detection and the URL policy
/// applied to every hop.
fn redirect_policy(policy: UrlPolicy) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        if let Err(e) = policy.check_parsed(url) {
            return attempt.error(e);
        }

        tracing::debug!(to = %url, hop = attempt.previous().len(), "Following redirect");
        attempt.follow()
    })
}

/// Streams the body, failing once it passes `limit` bytes.
///
/// A body shorter than its declared `Content-Length` is reported as
/// [`FetchError::IncompleteResponse`] so the caller can retry it.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(FetchError::ResponseTooLarge);
    }

    let capacity = declared.map_or(0, |len| len as usize);
    let mut body = Vec::with_capacity(capacity);
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    match declared {
        Some(expected) if (body.len() as u64) < expected => Err(FetchError::IncompleteResponse {
            expected,
            received: body.len(),
        }),
        _ => Ok(body),
    }
}

// ============================================================================
// Cached Fetcher
// ============================================================================

/// Outcome of fetching one feed URL. Failures stay local to their URL.
#[derive(Debug)]
pub struct FeedOutcome {
    pub url: String,
    pub result: Result<Arc<ParsedFeed>, FetchError>,
}

/// Fetches feeds through the shared [`FeedCache`].
///
/// A fresh cache entry is reused as-is. Otherwise the feed is fetched,
/// parsed and written back. Refreshes of the same URL are serialised through
/// a per-URL gate, and the cache is re-checked once the gate is acquired, so
/// concurrent requests for one stale URL normally trigger a single fetch.
pub struct FeedFetcher<S> {
    source: S,
    cache: Arc<FeedCache>,
    gates: Mutex<GateMap>,
    concurrency: usize,
    timeout: Duration,
}

impl<S: FeedSource> FeedFetcher<S> {
    pub fn new(source: S, cache: Arc<FeedCache>) -> Self {
        Self {
            source,
            cache,
            gates: Mutex::new(HashMap::new()),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Maximum number of feeds fetched at once within one call (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Upper bound on a single document fetch, retries included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches every URL, returning one outcome per input URL in input order.
    ///
    /// Up to `concurrency` fetches run at once; the call returns only after
    /// every fetch has finished or failed.
    pub async fn fetch_many(&self, urls: &[String]) -> Vec<FeedOutcome> {
        let fetches: Vec<BoxFuture<'_, FeedOutcome>> = urls
            .iter()
            .map(|url| self.fetch_outcome(url.clone()).boxed())
            .collect();

        stream::iter(fetches)
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn fetch_outcome(&self, url: String) -> FeedOutcome {
        let result = self.fetch_one(&url).await;
        if let Err(e) = &result {
            tracing::warn!(url = %url, error = %e, "Feed fetch failed");
        }
        FeedOutcome { url, result }
    }

    /// Returns the feed for `url`, from cache when fresh.
    pub async fn fetch_one(&self, url: &str) -> Result<Arc<ParsedFeed>, FetchError> {
        if let Some(feed) = self.cache.get_fresh(url) {
            tracing::debug!(url = %url, "Feed cache hit");
            return Ok(feed);
        }

        let lease = self.acquire_gate(url);
        let _guard = lease.gate.lock().await;
        match self.cache.get_fresh(url) {
            // Another request refreshed it while we waited
            Some(feed) => Ok(feed),
            None => self.refresh(url).await,
        }
    }

    /// Fetches raw bytes for `url` without touching the cache.
    pub async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tokio::time::timeout(self.timeout, self.source.fetch(url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn refresh(&self, url: &str) -> Result<Arc<ParsedFeed>, FetchError> {
        let bytes = self.fetch_document(url).await?;
        let feed = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
        let feed = Arc::new(feed);

        tracing::debug!(url = %url, entries = feed.entries.len(), "Fetched feed");
        self.cache.put(url, CacheEntry::new(Arc::clone(&feed)));
        Ok(feed)
    }

    fn acquire_gate<'a>(&'a self, url: &'a str) -> GateLease<'a> {
        let gate = Arc::clone(self.lock_gates().entry(url.to_string()).or_default());
        GateLease {
            gates: &self.gates,
            url,
            gate,
        }
    }

    fn lock_gates(&self) -> MutexGuard<'_, GateMap> {
        lock_gate_map(&self.gates)
    }
}

type GateMap = HashMap<String, Arc<AsyncMutex<()>>>;

fn lock_gate_map(gates: &Mutex<GateMap>) -> MutexGuard<'_, GateMap> {
    gates.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A handle on one URL's refresh gate.
///
/// Dropping it removes the gate from the map once no other request holds it,
/// including when the fetch future is cancelled mid-refresh.
struct GateLease<'a> {
    gates: &'a Mutex<GateMap>,
    url: &'a str,
    gate: Arc<AsyncMutex<()>>,
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut gates = lock_gate_map(self.gates);
        let unshared = gates
            .get(self.url)
            .is_some_and(|current| Arc::ptr_eq(current, &self.gate));
        // Only the map and this handle remain: nobody else is waiting
        if unshared && Arc::strong_count(&self.gate) <= 2 {
            gates.remove(self.url);
        }
    }
}
