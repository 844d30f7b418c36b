use super::types::{FullContent, Item, ParsedFeed, RawEntry};

/// Maps every entry of `feed` into a canonical [`Item`], in feed order.
///
/// `source` is the feed title, or `feed_url` when the feed has none.
pub fn normalize(feed_url: &str, feed: &ParsedFeed) -> Vec<Item> {
    let source = feed.title.as_deref().unwrap_or(feed_url);

    feed.entries
        .iter()
        .map(|entry| normalize_entry(source, entry))
        .collect()
}

fn normalize_entry(source: &str, entry: &RawEntry) -> Item {
    Item {
        title: entry.title.clone(),
        link: entry.link.clone(),
        published: entry.published.clone(),
        summary: entry.summary.clone().unwrap_or_default(),
        source: source.to_string(),
        full_content: full_content(entry),
        audio: audio_enclosures(entry),
        published_at: entry.published_parsed,
    }
}

/// Content body first, then description, then the explicit absence marker.
fn full_content(entry: &RawEntry) -> FullContent {
    if let Some(body) = entry.content.first() {
        FullContent::Content(body.clone())
    } else if let Some(description) = &entry.description {
        FullContent::Description(description.clone())
    } else {
        FullContent::Absent
    }
}

/// `None` rather than an empty list when the entry has no audio.
fn audio_enclosures(entry: &RawEntry) -> Option<Vec<String>> {
    let audio: Vec<String> = entry
        .enclosures
        .iter()
        .filter(|e| e.is_audio())
        .map(|e| e.href.clone())
        .collect();

    (!audio.is_empty()).then_some(audio)
}
