//! Parsing of the inline block-property syntax.
//!
//! This module is the only place that knows the text syntax. Everything above it (index, query,
//! suggestions, rewriting, graph) works with the typed [`Block`] / [`Property`] /
//! [`ParsedValue`](crate::properties::ParsedValue) values it produces.
//!
//! ## Key Components
//!
//! - [`block`] - the property parser (`^id [key: value, ...]`), bracket spans, block ids
//! - [`link`] - typed link extraction from a single property value
//! - [`lines`] - line-by-line scanning of a whole document
//!
//! ## Syntax
//!
//! | Element | Form |
//! |---|---|
//! | block marker | `^[\w-]+` |
//! | property list | `[key: value, key2: value2]` right after the marker (spaces/tabs allowed) |
//! | note link | `[[target]]`, `[[target\|alias]]` |
//! | block reference | `^identifier` |
//!
//! ```rust
//! use blockprops::codec::{parse_blocks, serialize_properties};
//!
//! let line = "Ship it ^rel-1 [status: todo, owner: [[Alice]]]";
//! let blocks = parse_blocks(line, 0);
//! assert_eq!(blocks[0].block_id, "rel-1");
//! assert_eq!(blocks[0].properties[1].parsed.links[0].target, "Alice");
//! assert_eq!(serialize_properties(&blocks[0].properties), "status: todo, owner: [[Alice]]");
//! ```

pub mod block;
pub mod link;

pub use block::{
    bare_block_ids, bare_markers, block_ids, bracket_spans, open_property_list, parse_blocks,
    serialize_pairs, serialize_properties, top_level_commas, BracketSpan,
};
pub use link::{
    has_links, is_single_block_ref, is_single_note_link, link_positions, parse_value,
    LinkPosition,
};

use regex::Regex;

use crate::properties::Block;

/// Blocks found on one line of a document.
#[derive(Debug, Clone)]
pub struct LineBlocks<'a> {
    /// Zero-based line number.
    pub line: usize,
    pub text: &'a str,
    /// Blocks with ranges relative to the start of `text`.
    pub blocks: Vec<Block>,
}

/// Splits `content` on `\n` and parses each non-empty line, yielding only lines that carry at
/// least one block.
pub fn lines(content: &str) -> impl Iterator<Item = LineBlocks<'_>> {
    content
        .split('\n')
        .enumerate()
        .filter(|(_, text)| !text.is_empty())
        .filter_map(|(line, text)| {
            let blocks = parse_blocks(text, 0);
            (!blocks.is_empty()).then_some(LineBlocks { line, text, blocks })
        })
}

/// Zero-based line number of the byte `offset` in `content`.
pub fn line_of_offset(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|b| **b == b'\n').count()
}

/// Zero-based line of the first `^block_id` marker in `content` that is followed by whitespace,
/// a `[`, or the end of the line.
pub fn find_block_line(content: &str, block_id: &str) -> Option<usize> {
    let pattern = Regex::new(&format!(r"\^{}(?:\s|\[|$)", regex::escape(block_id))).ok()?;
    content
        .split('\n')
        .position(|line| !line.is_empty() && pattern.is_match(line))
}

/// Context snippet for a block: the line text before the marker, trimmed and cut to `max_chars`
/// characters.
pub fn context_before(text: &str, block: &Block, max_chars: usize) -> String {
    text[..block.range.start]
        .trim()
        .chars()
        .take(max_chars)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_lines_reports_line_numbers() {
        let content = "# Title\n\nTask ^a [status: todo]\nnothing\n^b [status: done]";
        let found: Vec<(usize, String)> = lines(content)
            .flat_map(|l| {
                l.blocks
                    .into_iter()
                    .map(move |b| (l.line, b.block_id))
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(found, vec![(2, "a".to_string()), (4, "b".to_string())]);
    }

    #[test]
    fn test_line_of_offset() {
        let content = "a\nbb\nccc";
        assert_eq!(line_of_offset(content, 0), 0);
        assert_eq!(line_of_offset(content, 2), 1);
        assert_eq!(line_of_offset(content, 5), 2);
        assert_eq!(line_of_offset(content, 500), 2);
    }

    #[test]
    fn test_find_block_line() {
        let content = "^abc-1 plain\n^abc [k: v]\nref ^abc\n^abc";
        assert_eq!(find_block_line(content, "abc"), Some(1));
        assert_eq!(find_block_line(content, "abc-1"), Some(0));
        assert_eq!(find_block_line("x ^abcd [k: v]", "abc"), None);
        assert_eq!(find_block_line("", "a"), None);
    }

    #[test]
    fn test_context_before_truncates() {
        let text = format!("{} ^a [k: v]", "x".repeat(80));
        let blocks = parse_blocks(&text, 0);
        assert_eq!(context_before(&text, &blocks[0], 60).len(), 60);
        let blocks = parse_blocks("^a [k: v]", 0);
        assert_eq!(context_before("^a [k: v]", &blocks[0], 60), "");
    }
}
