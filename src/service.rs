//! Timeline aggregation: OPML in, one page of merged feed items out.

use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::feed::{
    normalize, paginate, resolve, FeedCache, FeedFetcher, FeedSource, FetchError, HttpFeedSource,
    Item, OpmlError, DEFAULT_LIMIT,
};

/// Where the OPML subscription list comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum OpmlSource {
    /// Raw bytes of an uploaded OPML file.
    Upload(Vec<u8>),
    /// URL of an OPML document to fetch.
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRequest {
    pub source: Option<OpmlSource>,
    pub cursor: Option<f64>,
    pub limit: NonZeroUsize,
}

impl TimelineRequest {
    pub fn new(source: OpmlSource) -> Self {
        Self {
            source: Some(source),
            cursor: None,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<f64>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_limit(mut self, limit: NonZeroUsize) -> Self {
        self.limit = limit;
        self
    }
}

/// A feed that contributed no items to the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFeed {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineResponse {
    pub items: Vec<Item>,
    pub next_cursor: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_feeds: Vec<FailedFeed>,
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("No file or URL provided")]
    InputMissing,

    #[error("Failed to fetch OPML from URL: {source}")]
    UpstreamFetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{0}")]
    Parse(String),

    #[error("No RSS URLs found in the OPML file")]
    NoFeedsFound,

    #[error("All {0} feeds failed to load")]
    AllFeedsFailed(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OpmlError> for TimelineError {
    fn from(e: OpmlError) -> Self {
        match e {
            OpmlError::NoFeedsFound => TimelineError::NoFeedsFound,
            OpmlError::Parse(_) => TimelineError::Parse(e.to_string()),
        }
    }
}

/// Builds timeline pages from OPML subscription lists.
///
/// Feeds are fetched through the shared cache held by the fetcher, so
/// repeated requests for the same subscriptions within the TTL cost no
/// upstream traffic.
pub struct TimelineService<S> {
    fetcher: FeedFetcher<S>,
}

impl TimelineService<HttpFeedSource> {
    /// Wires the HTTP source, cache and fetcher from configuration.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let source = HttpFeedSource::new(config.fetch_timeout(), config.url_policy())?;
        let cache = Arc::new(FeedCache::with_capacity(
            config.cache_ttl(),
            config.cache_capacity,
        ));
        let fetcher = FeedFetcher::new(source, cache)
            .with_concurrency(config.fetch_concurrency)
            .with_timeout(config.fetch_timeout());
        Ok(Self::new(fetcher))
    }
}

impl<S: FeedSource> TimelineService<S> {
    pub fn new(fetcher: FeedFetcher<S>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &FeedFetcher<S> {
        &self.fetcher
    }

    /// Resolves, fetches, merges and pages the feeds behind `request`.
    ///
    /// OPML problems are reported before any feed is fetched. Failing feeds
    /// are skipped and listed in `failed_feeds`; the request only fails when
    /// every feed did.
    pub async fn page(&self, request: TimelineRequest) -> Result<TimelineResponse, TimelineError> {
        let document = match request.source.ok_or(TimelineError::InputMissing)? {
            OpmlSource::Upload(bytes) => bytes,
            OpmlSource::Url(url) => {
                tracing::debug!(url = %url, "Fetching OPML document");
                self.fetcher
                    .fetch_document(&url)
                    .await
                    .map_err(|source| TimelineError::UpstreamFetch { url, source })?
            }
        };

        let urls = resolve(&document)?;
        tracing::info!(feeds = urls.len(), "Resolved OPML subscriptions");

        let outcomes = self.fetcher.fetch_many(&urls).await;

        let mut items = Vec::new();
        let mut failed_feeds = Vec::new();
        for outcome in &outcomes {
            match &outcome.result {
                Ok(feed) => items.extend(normalize(&outcome.url, feed)),
                Err(e) => failed_feeds.push(FailedFeed {
                    url: outcome.url.clone(),
                    error: e.to_string(),
                }),
            }
        }

        if failed_feeds.len() == outcomes.len() {
            tracing::warn!(feeds = outcomes.len(), "Every feed failed to load");
            return Err(TimelineError::AllFeedsFailed(outcomes.len()));
        }

        let total = items.len();
        let page = paginate(items, request.cursor, request.limit);
        tracing::info!(
            total_items = total,
            returned = page.items.len(),
            failed = failed_feeds.len(),
            has_more = page.next_cursor.is_some(),
            "Built timeline page"
        );

        Ok(TimelineResponse {
            items: page.items,
            next_cursor: page.next_cursor,
            failed_feeds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned documents by URL and counts requests.
    #[derive(Default)]
    struct MapSource {
        documents: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl MapSource {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.documents.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl FeedSource for MapSource {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.documents
                .get(url)
                .map(|body| body.clone().into_bytes())
                .ok_or(FetchError::HttpStatus(404))
        }
    }

    fn service(source: MapSource) -> TimelineService<MapSource> {
        let cache = Arc::new(FeedCache::new(crate::feed::DEFAULT_TTL));
        TimelineService::new(FeedFetcher::new(source, cache))
    }

    fn calls(service: &TimelineService<MapSource>) -> usize {
        service.fetcher().source().calls.load(Ordering::SeqCst)
    }

    fn opml(urls: &[&str]) -> Vec<u8> {
        let outlines: String = urls
            .iter()
            .map(|u| format!(r#"<outline text="f" type="rss" xmlUrl="{u}"/>"#))
            .collect();
        format!(r#"<?xml version="1.0"?><opml version="2.0"><head/><body>{outlines}</body></opml>"#)
            .into_bytes()
    }

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Only</title>
<item><title>one</title><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
</channel></rss>"#;

    #[test]
    fn test_page_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let svc = service(MapSource::default());
        assert_send(svc.page(TimelineRequest::new(OpmlSource::Upload(opml(&[
            "https://a.example.com/rss",
        ])))));
    }

    #[tokio::test]
    async fn test_missing_input() {
        let svc = service(MapSource::default());
        let request = TimelineRequest {
            source: None,
            cursor: None,
            limit: DEFAULT_LIMIT,
        };
        let err = svc.page(request).await.unwrap_err();
        assert!(matches!(err, TimelineError::InputMissing));
        assert_eq!(err.to_string(), "No file or URL provided");
    }

    #[tokio::test]
    async fn test_upload_happy_path() {
        let svc = service(MapSource::default().with("https://a.example.com/rss", FEED));
        let response = svc
            .page(TimelineRequest::new(OpmlSource::Upload(opml(&[
                "https://a.example.com/rss",
            ]))))
            .await
            .unwrap();

        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].source, "Only");
        assert_eq!(response.next_cursor, None);
        assert!(response.failed_feeds.is_empty());
    }

    #[tokio::test]
    async fn test_opml_url_is_fetched_then_resolved() {
        let opml_doc = String::from_utf8(opml(&["https://a.example.com/rss"])).unwrap();
        let svc = service(
            MapSource::default()
                .with("https://lists.example.com/subs.opml", &opml_doc)
                .with("https://a.example.com/rss", FEED),
        );

        let response = svc
            .page(TimelineRequest::new(OpmlSource::Url(
                "https://lists.example.com/subs.opml".to_string(),
            )))
            .await
            .unwrap();

        assert_eq!(response.items.len(), 1);
        assert_eq!(calls(&svc), 2);
    }

    #[tokio::test]
    async fn test_opml_url_failure_is_upstream_error() {
        let svc = service(MapSource::default());
        let err = svc
            .page(TimelineRequest::new(OpmlSource::Url(
                "https://lists.example.com/missing.opml".to_string(),
            )))
            .await
            .unwrap_err();

        match err {
            TimelineError::UpstreamFetch { url, source } => {
                assert_eq!(url, "https://lists.example.com/missing.opml");
                assert!(matches!(source, FetchError::HttpStatus(404)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parse_error_fetches_nothing() {
        let svc = service(MapSource::default());
        let err = svc
            .page(TimelineRequest::new(OpmlSource::Upload(
                b"<opml><body><outline xmlUrl=\"https://a.example.com/rss\"></body>".to_vec(),
            )))
            .await
            .unwrap_err();

        assert!(matches!(err, TimelineError::Parse(_)));
        assert_eq!(calls(&svc), 0);
    }

    #[tokio::test]
    async fn test_no_feeds_found() {
        let svc = service(MapSource::default());
        let err = svc
            .page(TimelineRequest::new(OpmlSource::Upload(opml(&[]))))
            .await
            .unwrap_err();

        assert!(matches!(err, TimelineError::NoFeedsFound));
        assert_eq!(calls(&svc), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported() {
        let svc = service(MapSource::default().with("https://a.example.com/rss", FEED));
        let response = svc
            .page(TimelineRequest::new(OpmlSource::Upload(opml(&[
                "https://gone.example.com/rss",
                "https://a.example.com/rss",
            ]))))
            .await
            .unwrap();

        assert_eq!(response.items.len(), 1);
        assert_eq!(
            response.failed_feeds,
            vec![FailedFeed {
                url: "https://gone.example.com/rss".to_string(),
                error: "HTTP error: status 404".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_all_feeds_failed() {
        let svc = service(MapSource::default());
        let err = svc
            .page(TimelineRequest::new(OpmlSource::Upload(opml(&[
                "https://gone.example.com/a",
                "https://gone.example.com/b",
            ]))))
            .await
            .unwrap_err();

        assert!(matches!(err, TimelineError::AllFeedsFailed(2)));
    }

    #[test]
    fn test_response_json_shape() {
        let response = TimelineResponse {
            items: Vec::new(),
            next_cursor: None,
            failed_feeds: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"items": [], "next_cursor": null})
        );

        let response = TimelineResponse {
            items: Vec::new(),
            next_cursor: Some(1_704_067_200.0),
            failed_feeds: vec![FailedFeed {
                url: "https://gone.example.com/rss".to_string(),
                error: "Request timed out".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "items": [],
                "next_cursor": 1_704_067_200.0,
                "failed_feeds": [{"url": "https://gone.example.com/rss", "error": "Request timed out"}]
            })
        );
    }
}
