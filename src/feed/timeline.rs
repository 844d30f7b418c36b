//! Merge-sort-paginate over normalized items.
//!
//! The cursor is an exclusive upper bound: a page holds only items strictly
//! older than it. `next_cursor` is the timestamp of the first item *not*
//! returned, so that item (and anything sharing its second) is skipped by the
//! following page. Pages never overlap.

use chrono::{DateTime, Utc};
use std::num::NonZeroUsize;

use super::types::Item;

/// Page size used when the client does not ask for one.
pub const DEFAULT_LIMIT: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(n) => n,
    None => unreachable!(),
};

/// One page of the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Timestamp of the newest item of the next page; `None` at the end of the stream.
    pub next_cursor: Option<f64>,
}

/// Sorts `items` newest first and returns the page below `cursor`.
///
/// 1. Items without `published_at` are dropped
/// 2. The rest are sorted by `published_at` descending; equal timestamps keep
///    their input order
/// 3. With a cursor, only items strictly older than it remain
/// 4. The first `limit` items form the page
/// 5. `next_cursor` is the timestamp of the item right after the page, if any
pub fn paginate(items: Vec<Item>, cursor: Option<f64>, limit: NonZeroUsize) -> Page {
    let mut dated: Vec<(DateTime<Utc>, Item)> = items
        .into_iter()
        .filter_map(|item| item.published_at.map(|at| (at, item)))
        .collect();

    // sort_by is stable
    dated.sort_by(|a, b| b.0.cmp(&a.0));

    if let Some(cursor) = cursor {
        dated.retain(|(at, _)| unix_timestamp(at) < cursor);
    }

    let limit = limit.get();
    let next_cursor = dated.get(limit).map(|(at, _)| unix_timestamp(at));
    dated.truncate(limit);

    Page {
        items: dated.into_iter().map(|(_, item)| item).collect(),
        next_cursor,
    }
}

/// Seconds since the Unix epoch as a float, the cursor representation.
pub fn unix_timestamp(at: &DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1_000_000_000.0
}
