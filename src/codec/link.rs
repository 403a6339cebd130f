//! Extraction of typed links from a single property value.
//!
//! Two link syntaxes are recognised:
//!
//! - note links, `[[target]]` or `[[target|alias]]`
//! - block references, `^identifier`
//!
//! A block reference that starts inside a note link (`[[Plan#^step-2]]`) is an anchor of that
//! note link and is never reported on its own.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::properties::{Link, LinkKind, ParsedValue};

static NOTE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]]*)\]\]").expect("note link pattern is valid"));

static BLOCK_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\^([A-Za-z0-9_-]+)").expect("block reference pattern is valid"));

/// A link together with its byte range inside the value it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPosition {
    pub from: usize,
    pub to: usize,
    pub link: Link,
}

/// Parses `value` into its raw text plus every note link and standalone block reference.
///
/// Note links come first, in order of appearance, followed by block references.
pub fn parse_value(value: &str) -> ParsedValue {
    let mut links = Vec::new();
    let mut note_spans: Vec<Range<usize>> = Vec::new();

    for caps in NOTE_LINK.captures_iter(value) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let (target, alias) = match inner.as_str().split_once('|') {
            Some((target, alias)) => {
                let alias = alias.trim();
                (target.trim(), (!alias.is_empty()).then_some(alias))
            }
            None => (inner.as_str().trim(), None),
        };
        if target.is_empty() {
            continue;
        }
        note_spans.push(whole.range());
        links.push(Link::note(whole.as_str(), target, alias));
    }

    for caps in BLOCK_REF.captures_iter(value) {
        let (Some(whole), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let start = whole.start();
        if note_spans.iter().any(|span| span.contains(&start)) {
            continue;
        }
        links.push(Link::block(whole.as_str(), id.as_str()));
    }

    ParsedValue {
        raw: value.to_string(),
        links,
    }
}

/// Locates every link of `value`, sorted by position.
///
/// Each link's raw text is re-located at its first occurrence not already claimed by another
/// link, so repeated links (`^a, ^a`) map to distinct ranges.
pub fn link_positions(value: &str) -> Vec<LinkPosition> {
    let parsed = parse_value(value);
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut positions = Vec::new();

    for link in parsed.links {
        let found = value.match_indices(link.raw.as_str()).find_map(|(idx, raw)| {
            let range = idx..idx + raw.len();
            let overlaps = claimed
                .iter()
                .any(|c| c.start < range.end && range.start < c.end);
            (!overlaps).then_some(range)
        });
        if let Some(range) = found {
            claimed.push(range.clone());
            positions.push(LinkPosition {
                from: range.start,
                to: range.end,
                link,
            });
        }
    }

    positions.sort_by_key(|p| p.from);
    positions
}

pub fn has_links(value: &str) -> bool {
    !parse_value(value).links.is_empty()
}

/// True when the whole (trimmed) value is exactly one note link.
pub fn is_single_note_link(value: &str) -> bool {
    is_single_link_of(value, LinkKind::Note)
}

/// True when the whole (trimmed) value is exactly one block reference.
pub fn is_single_block_ref(value: &str) -> bool {
    is_single_link_of(value, LinkKind::Block)
}

fn is_single_link_of(value: &str, kind: LinkKind) -> bool {
    let parsed = parse_value(value);
    match parsed.links.as_slice() {
        [link] => link.kind == kind && link.raw == value.trim(),
        _ => false,
    }
}
