use chrono::SubsecRound;
use feed_rs::model::{Entry, Link};
use feed_rs::parser::{self, ParseFeedError};

use super::types::{Enclosure, ParsedFeed, RawEntry};

/// Parses RSS/Atom bytes into a [`ParsedFeed`].
///
/// Only the entry's publication time is carried over as a date; `updated`
/// is ignored so entries that merely record an edit time stay undated.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let entries = feed.entries.into_iter().map(map_entry).collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content),
        entries,
    })
}

fn map_entry(entry: Entry) -> RawEntry {
    let link = select_link(&entry.links);
    let enclosures = collect_enclosures(&entry);

    let published = entry.published.map(|dt| dt.to_rfc2822());
    let published_parsed = entry.published.map(|dt| dt.trunc_subsecs(0));

    // feed-rs folds RSS <description> and Atom <summary> into one field
    let summary = entry.summary.map(|s| s.content);

    let content = entry
        .content
        .and_then(|c| c.body)
        .into_iter()
        .collect::<Vec<_>>();

    RawEntry {
        title: entry.title.map(|t| t.content),
        link,
        published,
        published_parsed,
        description: summary.clone(),
        summary,
        content,
        enclosures,
    }
}

/// Prefers an `alternate` (or rel-less) link, falling back to the first one.
fn select_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| {
            l.rel
                .as_deref()
                .map_or(true, |rel| rel.eq_ignore_ascii_case("alternate"))
        })
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

fn collect_enclosures(entry: &Entry) -> Vec<Enclosure> {
    let from_media = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|c| {
            let href = c.url.as_ref()?.to_string();
            Some(Enclosure {
                href,
                media_type: c.content_type.as_ref().map(|m| m.to_string()),
            })
        });

    let from_links = entry
        .links
        .iter()
        .filter(|l| {
            l.rel
                .as_deref()
                .is_some_and(|rel| rel.eq_ignore_ascii_case("enclosure"))
        })
        .map(|l| Enclosure {
            href: l.href.clone(),
            media_type: l.media_type.clone(),
        });

    from_media.chain(from_links).collect()
}
