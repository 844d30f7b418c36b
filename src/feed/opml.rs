use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Deepest accepted `<outline>` nesting.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur while resolving an OPML document to feed URLs.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// The document could not be read as an outline list.
    #[error("Error parsing OPML: {0}")]
    Parse(String),

    /// The document parsed but listed no feed URLs.
    #[error("No RSS URLs found in the OPML file")]
    NoFeedsFound,
}

/// Resolves OPML content into the feed URLs it lists.
///
/// Every `<outline>` carrying a non-empty `xmlUrl` contributes its URL in
/// document order, at any nesting depth. Category outlines without `xmlUrl`
/// are traversed but skipped. Duplicates are kept.
///
/// # Errors
///
/// - [`OpmlError::Parse`] if the content is not UTF-8, is not well-formed
///   XML, has no `<opml>` root, or nests outlines deeper than 50 levels
/// - [`OpmlError::NoFeedsFound`] if parsing succeeded but no URL was found
///
/// # Security
///
/// XXE (XML External Entity) attacks are mitigated because `quick-xml` (0.37)
/// does not parse `<!ENTITY>` declarations. Custom entities cause
/// `EscapeError::UnrecognizedEntity`, surfaced here as a parse error.
pub fn resolve(content: &[u8]) -> Result<Vec<String>, OpmlError> {
    let text = std::str::from_utf8(content)
        .map_err(|e| OpmlError::Parse(format!("content is not valid UTF-8: {e}")))?;

    let urls = parse_opml_content(text)?;
    if urls.is_empty() {
        return Err(OpmlError::NoFeedsFound);
    }

    tracing::debug!(feeds = urls.len(), "Resolved OPML feed list");
    Ok(urls)
}

fn parse_opml_content(content: &str) -> Result<Vec<String>, OpmlError> {
    // SEC-002: entity resolution only covers the 5 XML builtins;
    // `decode_and_unescape_value()` (not `_with()`) makes custom entities error out
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut seen_root = false;
    // SEC-003: depth of currently open <outline> elements
    let mut depth: usize = 0;

    loop {
        let event = reader.read_event().map_err(|e| {
            OpmlError::Parse(format!("{e} (at byte {})", reader.buffer_position()))
        })?;

        let (element, opens_scope) = match &event {
            Event::Start(e) => (e, true),
            Event::Empty(e) => (e, false),
            Event::End(e) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        match element.name().as_ref() {
            b"opml" => seen_root = true,
            b"outline" => {
                if opens_scope {
                    depth += 1;
                    if depth > MAX_OPML_DEPTH {
                        return Err(OpmlError::Parse(format!(
                            "outline nesting depth exceeds maximum of {MAX_OPML_DEPTH} levels"
                        )));
                    }
                }
                urls.extend(outline_feed_url(element, &reader)?);
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(OpmlError::Parse(
            "document has no <opml> root element".to_string(),
        ));
    }

    Ok(urls)
}

/// Returns the outline's trimmed `xmlUrl` (any letter case), or `None` for
/// folders and blanks.
fn outline_feed_url(
    element: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<String>, OpmlError> {
    let xml_url = element
        .attributes()
        .filter_map(|attr| {
            attr.map_err(|e| tracing::warn!(error = %e, "Skipping malformed OPML attribute"))
                .ok()
        })
        .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(b"xmlUrl"));

    let Some(attr) = xml_url else {
        return Ok(None);
    };
    let value = attr
        .decode_and_unescape_value(reader.decoder())
        .map_err(|e| OpmlError::Parse(e.to_string()))?;
    let url = value.trim();
    Ok((!url.is_empty()).then(|| url.to_string()))
}
