//! The property parser: finds `^block-id [key: value, ...]` blocks in a text buffer.
//!
//! Parsing never fails. Malformed fragments are skipped rather than reported:
//!
//! - a segment without a colon, or with an empty key, is dropped from its block
//! - a marker whose `[` is never closed on the same line produces no block
//!
//! Brackets are matched by depth, so a value holding a note link (`owner: [[Alice]]`) does not
//! end the property list early, and commas inside `[[...]]` do not split segments.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use crate::{
    codec::link::parse_value,
    properties::{Block, Property},
};

static BLOCK_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\^([A-Za-z0-9_-]+)").expect("block marker pattern is valid"));

static TRAILING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\^[A-Za-z0-9_-]+[ \t]*$").expect("trailing marker pattern is valid")
});

/// Location of one block's bracketed property list, without the parsed properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketSpan {
    pub block_id: String,
    /// Byte range of the whole `^id [ ... ]` match.
    pub range: Range<usize>,
    /// Byte range from `[` through `]`.
    pub bracket: Range<usize>,
}

/// Parses every block in `text`. All ranges are offset by `bias`, which lets callers parse a
/// single line while reporting positions relative to the enclosing document.
pub fn parse_blocks(text: &str, bias: usize) -> Vec<Block> {
    bracket_spans(text)
        .into_iter()
        .map(|span| {
            let body_start = span.bracket.start + 1;
            let body_end = span.bracket.end - 1;
            let properties = parse_properties(&text[body_start..body_end], body_start + bias);
            Block {
                block_id: span.block_id,
                properties,
                range: span.range.start + bias..span.range.end + bias,
                bracket: span.bracket.start + bias..span.bracket.end + bias,
            }
        })
        .collect()
}

/// Finds the bracket span of every block in `text` (unbiased byte offsets).
pub fn bracket_spans(text: &str) -> Vec<BracketSpan> {
    let mut spans = Vec::new();
    let mut consumed = 0;

    for caps in BLOCK_MARKER.captures_iter(text) {
        let (Some(marker), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if marker.start() < consumed {
            // Markers inside a previous block's property list are references, not blocks.
            continue;
        }
        let Some(open) = skip_inline_whitespace(text, marker.end()) else {
            continue;
        };
        if text.as_bytes()[open] != b'[' {
            continue;
        }
        let Some(close) = matching_bracket(text, open) else {
            continue;
        };
        spans.push(BracketSpan {
            block_id: id.as_str().to_string(),
            range: marker.start()..close + 1,
            bracket: open..close + 1,
        });
        consumed = close + 1;
    }

    spans
}

/// Every bare `^id` marker in `text` with its byte range: markers that are neither followed by a
/// property list nor located inside one. Order of appearance, duplicates kept.
pub fn bare_markers(text: &str) -> Vec<(String, Range<usize>)> {
    let spans = bracket_spans(text);
    BLOCK_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let marker = caps.get(0)?;
            if spans.iter().any(|s| s.range.contains(&marker.start())) {
                return None;
            }
            caps.get(1)
                .map(|id| (id.as_str().to_string(), marker.range()))
        })
        .collect()
}

pub fn bare_block_ids(text: &str) -> Vec<String> {
    bare_markers(text).into_iter().map(|(id, _)| id).collect()
}

/// Every block id defined in `text`, with or without properties, first occurrence first and
/// without duplicates.
pub fn block_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let spans = bracket_spans(text);
    for caps in BLOCK_MARKER.captures_iter(text) {
        let (Some(marker), Some(id)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let is_reference = spans
            .iter()
            .any(|s| s.bracket.contains(&marker.start()));
        if !is_reference && !ids.iter().any(|known| known == id.as_str()) {
            ids.push(id.as_str().to_string());
        }
    }
    ids
}

/// Byte offset of the `[` that opens the property list still unclosed at `cursor` in `line`.
///
/// Brackets are tracked by depth, so an unfinished `[[note` inside a value does not hide the list
/// it sits in. Only a `[` directly preceded by a block marker (spaces/tabs allowed) qualifies.
pub fn open_property_list(line: &str, cursor: usize) -> Option<usize> {
    let before = line.get(..cursor)?;
    let mut open: Vec<usize> = Vec::new();
    for (idx, byte) in before.bytes().enumerate() {
        match byte {
            b'[' => open.push(idx),
            b']' => {
                open.pop();
            }
            _ => {}
        }
    }
    open.into_iter()
        .rev()
        .find(|idx| TRAILING_MARKER.is_match(&before[..*idx]))
}

/// Top-level comma offsets in `body`, ignoring commas nested in brackets.
pub fn top_level_commas(body: &str) -> Vec<usize> {
    split_segments(body)
        .iter()
        .skip(1)
        .map(|segment| segment.start - 1)
        .collect()
}

/// Serializes key/value pairs back into bracket-body form: `key: value, key2: value2`.
pub fn serialize_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<String>>()
        .join(", ")
}

pub fn serialize_properties(properties: &[Property]) -> String {
    serialize_pairs(properties.iter().map(Property::pair))
}

fn skip_inline_whitespace(text: &str, from: usize) -> Option<usize> {
    text[from..]
        .char_indices()
        .find(|(_, c)| *c != ' ' && *c != '\t')
        .map(|(idx, _)| from + idx)
}

/// Index of the `]` closing the `[` at `open`, never crossing a line break.
fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, byte) in text.as_bytes()[open..].iter().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            b'\n' => return None,
            _ => {}
        }
    }
    None
}

/// Splits a bracket body on top-level commas and each segment on its first colon.
fn parse_properties(body: &str, body_offset: usize) -> Vec<Property> {
    split_segments(body)
        .into_iter()
        .filter_map(|segment| {
            let text = &body[segment.clone()];
            let colon = text.find(':')?;
            let key = text[..colon].trim();
            if key.is_empty() {
                return None;
            }
            let raw_value = &text[colon + 1..];
            let value = raw_value.trim();
            let lead = raw_value.len() - raw_value.trim_start().len();
            let start = body_offset + segment.start + colon + 1 + lead;
            Some(Property {
                key: key.to_string(),
                value: value.to_string(),
                parsed: parse_value(value),
                value_span: start..start + value.len(),
            })
        })
        .collect()
}

fn split_segments(body: &str) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, byte) in body.bytes().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                segments.push(start..idx);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(start..body.len());
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::LinkKind;
    use test_log::test;

    fn pairs(block: &Block) -> Vec<(&str, &str)> {
        block.properties.iter().map(Property::pair).collect()
    }

    #[test]
    fn test_single_block() {
        let line = "Write the docs ^t1 [status: todo, priority: high]";
        let blocks = parse_blocks(line, 0);
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.block_id, "t1");
        assert_eq!(pairs(block), vec![("status", "todo"), ("priority", "high")]);
        assert_eq!(&line[block.range.clone()], "^t1 [status: todo, priority: high]");
        assert_eq!(&line[block.bracket.clone()], "[status: todo, priority: high]");
    }

    #[test]
    fn test_value_spans_point_at_values() {
        let line = "^a [ k :  spaced value , other:x]";
        let blocks = parse_blocks(line, 0);
        let props = &blocks[0].properties;
        assert_eq!(&line[props[0].value_span.clone()], "spaced value");
        assert_eq!(&line[props[1].value_span.clone()], "x");
        assert_eq!(props[0].key, "k");
    }

    #[test]
    fn test_bias_shifts_ranges() {
        let line = "^a [k: v]";
        let blocks = parse_blocks(line, 100);
        assert_eq!(blocks[0].range, 100..109);
        assert_eq!(blocks[0].bracket, 103..109);
        assert_eq!(blocks[0].properties[0].value_span, 107..108);
    }

    #[test]
    fn test_round_trip_bracket_content() {
        for line in [
            "^id [k: v, k2: v2]",
            "text ^task-9 [status: in-progress, owner: [[Alice]], blocked-by: ^qa-2]",
            "^x-y_z [a: 1]",
        ] {
            let blocks = parse_blocks(line, 0);
            assert_eq!(blocks.len(), 1, "{line}");
            let block = &blocks[0];
            let body = &line[block.bracket.start + 1..block.bracket.end - 1];
            assert_eq!(serialize_properties(&block.properties), body);
        }
    }

    #[test]
    fn test_malformed_segments_are_dropped() {
        let blocks = parse_blocks("^b [no colon here, : empty key, good: yes,]", 0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(pairs(&blocks[0]), vec![("good", "yes")]);
    }

    #[test]
    fn test_first_colon_splits() {
        let blocks = parse_blocks("^b [time: 10:30, url: https://example.com]", 0);
        assert_eq!(
            pairs(&blocks[0]),
            vec![("time", "10:30"), ("url", "https://example.com")]
        );
    }

    #[test]
    fn test_unmatched_bracket_yields_nothing() {
        assert!(parse_blocks("^b [status: todo", 0).is_empty());
        assert!(parse_blocks("^b [status: [[Note]", 0).is_empty());
        assert!(parse_blocks("^b [status: todo\n]", 0).is_empty());
    }

    #[test]
    fn test_marker_without_bracket_is_not_a_block() {
        assert!(parse_blocks("just a ^marker here", 0).is_empty());
        assert!(parse_blocks("^marker then text [k: v]", 0).is_empty());
    }

    #[test]
    fn test_note_link_values_keep_nested_brackets() {
        let blocks = parse_blocks("^a [owner: [[Alice, Bob]], ref: ^b]", 0);
        let block = &blocks[0];
        assert_eq!(
            pairs(block),
            vec![("owner", "[[Alice, Bob]]"), ("ref", "^b")]
        );
        assert_eq!(block.properties[0].parsed.links[0].kind, LinkKind::Note);
        assert_eq!(block.properties[1].parsed.links[0].target, "b");
    }

    #[test]
    fn test_multiple_blocks_on_one_line() {
        let blocks = parse_blocks("^a [k: 1] and ^b\t[k: 2]", 0);
        let ids: Vec<&str> = blocks.iter().map(|b| b.block_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_reference_inside_block_is_not_a_block() {
        let blocks = parse_blocks("^a [dep: ^b [x: y]]", 0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block_id, "a");
    }

    #[test]
    fn test_block_ids_and_bare_markers() {
        let text = "^a [dep: ^b]\nplain ^c\n^a again";
        assert_eq!(block_ids(text), vec!["a", "c"]);
        assert_eq!(bare_block_ids(text), vec!["c", "a"]);
        assert_eq!(bare_markers("x ^c")[0], ("c".to_string(), 2..4));
    }

    #[test]
    fn test_open_property_list() {
        let line = "Task ^a [status: do";
        assert_eq!(open_property_list(line, line.len()), Some(8));
        let line = "^a [owner: [[Al";
        assert_eq!(open_property_list(line, line.len()), Some(3));
        let line = "^a [owner: [[Alice]], ";
        assert_eq!(open_property_list(line, line.len()), Some(3));
        assert_eq!(open_property_list("^a [k: v] more", 14), None);
        assert_eq!(open_property_list("no marker [k: ", 14), None);
        assert_eq!(open_property_list("^a [k", 99), None);
    }

    #[test]
    fn test_top_level_commas() {
        assert_eq!(top_level_commas("a: 1, b: [[x, y]], c"), vec![4, 17]);
        assert!(top_level_commas("a: 1").is_empty());
    }

    #[test]
    fn test_empty_property_list_is_still_a_block() {
        let blocks = parse_blocks("^empty []", 0);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].properties.is_empty());
    }
}
