//! Feed acquisition and the merged timeline.
//!
//! This module turns an OPML subscription list into a paginated,
//! reverse-chronological timeline:
//!
//! - **Resolving**: Extract feed URLs from OPML content
//! - **Fetching**: Concurrent HTTP retrieval through a TTL cache
//! - **Normalizing**: Map heterogeneous RSS/Atom entries into one item shape
//! - **Paginating**: Merge, sort newest-first and page with a timestamp cursor
//!
//! # Architecture
//!
//! - [`opml`] - OPML parsing with `quick-xml`
//! - [`parser`] - RSS/Atom parsing with `feed-rs`
//! - [`cache`] - Process-wide feed cache with a fixed TTL
//! - [`fetcher`] - HTTP source, retry logic and cached, bounded-concurrency fetching
//! - [`normalize`] - Raw entry to [`Item`] mapping
//! - [`timeline`] - Sort/cursor/limit pagination
//!
//! # Example
//!
//! ```ignore
//! use opml2json::feed::{normalize, paginate, resolve, DEFAULT_LIMIT};
//!
//! let urls = resolve(&opml_bytes)?;
//! let outcomes = fetcher.fetch_many(&urls).await;
//! let items = outcomes
//!     .iter()
//!     .filter_map(|o| o.result.as_ref().ok().map(|f| normalize(&o.url, f)))
//!     .flatten()
//!     .collect();
//! let page = paginate(items, None, DEFAULT_LIMIT);
//! ```

pub mod cache;
pub mod fetcher;
pub mod normalize;
pub mod opml;
pub mod parser;
pub mod timeline;
mod types;

pub use cache::{CacheEntry, FeedCache, DEFAULT_TTL};
pub use fetcher::{FeedFetcher, FeedOutcome, FeedSource, FetchError, HttpFeedSource};
pub use normalize::normalize;
pub use opml::{resolve, OpmlError};
pub use parser::parse_feed;
pub use timeline::{paginate, unix_timestamp, Page, DEFAULT_LIMIT};
pub use types::{Enclosure, FullContent, Item, ParsedFeed, RawEntry, FULL_CONTENT_PLACEHOLDER};
