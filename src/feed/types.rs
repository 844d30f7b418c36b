use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Placeholder emitted as `full_content` when an entry carries neither a
/// content body nor a description.
pub const FULL_CONTENT_PLACEHOLDER: &str = "None";

// ============================================================================
// Parsed Feed (parser output, cached)
// ============================================================================

/// A feed as produced by the parser: feed-level title plus raw entries in
/// document order.
///
/// Stored in the cache behind an `Arc` and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<RawEntry>,
}

/// One feed entry with every field optional.
///
/// Feeds in the wild omit fields freely, so presence is checked explicitly
/// at the normalizer boundary instead of assuming defaults here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Human-readable publication time, for display only.
    pub published: Option<String>,
    /// Structured publication time (UTC, whole seconds). The only value used
    /// for ordering.
    pub published_parsed: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    /// Content bodies in document order. Only the first one is surfaced.
    pub content: Vec<String>,
    pub description: Option<String>,
    pub enclosures: Vec<Enclosure>,
}

/// A media attachment referenced by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub href: String,
    pub media_type: Option<String>,
}

impl Enclosure {
    pub fn is_audio(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|m| m.starts_with("audio/"))
    }
}

// ============================================================================
// Item (wire shape)
// ============================================================================

/// Where an item's `full_content` came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullContent {
    /// First element of the entry's content list.
    Content(String),
    /// The entry's description, used when no content body exists.
    Description(String),
    /// Neither was present.
    Absent,
}

impl FullContent {
    pub fn as_str(&self) -> &str {
        match self {
            FullContent::Content(s) | FullContent::Description(s) => s,
            FullContent::Absent => FULL_CONTENT_PLACEHOLDER,
        }
    }
}

impl Serialize for FullContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical timeline entry as returned to clients.
///
/// `published_at` is the sort/filter key and never leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub summary: String,
    pub source: String,
    pub full_content: FullContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<String>>,
    #[serde(skip)]
    pub published_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(full_content: FullContent, audio: Option<Vec<String>>) -> Item {
        Item {
            title: Some("Episode 1".to_string()),
            link: Some("https://example.com/1".to_string()),
            published: None,
            summary: String::new(),
            source: "Example".to_string(),
            full_content,
            audio,
            published_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_published_at_never_serialized() {
        let json = serde_json::to_value(item(FullContent::Absent, None)).unwrap();
        assert!(json.get("published_at").is_none());
        assert!(json.get("audio").is_none());
        assert_eq!(json["full_content"], "None");
        assert_eq!(json["published"], serde_json::Value::Null);
    }

    #[test]
    fn test_audio_serialized_when_present() {
        let json = serde_json::to_value(item(
            FullContent::Content("<p>body</p>".to_string()),
            Some(vec!["https://cdn.example.com/ep1.mp3".to_string()]),
        ))
        .unwrap();
        assert_eq!(json["audio"][0], "https://cdn.example.com/ep1.mp3");
        assert_eq!(json["full_content"], "<p>body</p>");
    }

    #[test]
    fn test_empty_description_distinct_from_placeholder() {
        let described = FullContent::Description(String::new());
        assert_eq!(described.as_str(), "");
        assert_ne!(described, FullContent::Absent);
    }

    #[test]
    fn test_enclosure_audio_detection() {
        let audio = Enclosure {
            href: "https://cdn.example.com/a.mp3".to_string(),
            media_type: Some("audio/mpeg".to_string()),
        };
        let video = Enclosure {
            href: "https://cdn.example.com/a.mp4".to_string(),
            media_type: Some("video/mp4".to_string()),
        };
        let untyped = Enclosure {
            href: "https://cdn.example.com/a.bin".to_string(),
            media_type: None,
        };
        assert!(audio.is_audio());
        assert!(!video.is_audio());
        assert!(!untyped.is_audio());
    }
}
