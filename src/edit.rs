//! Rewriting property values in place.
//!
//! Single-line edits ([`set_property`], [`remove_property`], [`insert_block_property`],
//! [`insert_template`]) are pure string transforms. [`apply_bulk_edit`] drives the value rewrite
//! over many documents: each document is read once, its matched lines are rewritten from the
//! highest line number down, and the result is written once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    codec,
    error::BlockPropsError,
    properties::{Block, PropertyTemplate},
    query::QueryResult,
    store::DocumentStore,
};

/// Block id used by [`insert_block_property`] when the line has no marker of its own.
pub const PLACEHOLDER_BLOCK_ID: &str = "block-id";

const BLOCK_ID_LEN: usize = 6;
const BLOCK_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkEditReport {
    pub success: usize,
    pub failed: usize,
}

impl std::fmt::Display for BulkEditReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} updated, {} failed", self.success, self.failed)
    }
}

fn find_block<'a>(blocks: &'a [Block], block_id: &str) -> Option<&'a Block> {
    blocks.iter().find(|b| b.block_id == block_id)
}

/// Replaces the value of `key` in block `block_id` on `line`. `None` when the block or the key is
/// not on the line.
///
/// Only the value text is replaced; spacing around it and the other properties are untouched.
pub fn rewrite_property_in_line(
    line: &str,
    block_id: &str,
    key: &str,
    new_value: &str,
) -> Option<String> {
    let blocks = codec::parse_blocks(line, 0);
    let property = find_block(&blocks, block_id)?.get(key)?;
    let span = property.value_span.clone();
    let mut rewritten = String::with_capacity(line.len() + new_value.len());
    rewritten.push_str(&line[..span.start]);
    rewritten.push_str(new_value);
    rewritten.push_str(&line[span.end..]);
    Some(rewritten)
}

fn replace_bracket(line: &str, block: &Block, pairs: Vec<(&str, &str)>) -> String {
    format!(
        "{}[{}]{}",
        &line[..block.bracket.start],
        codec::serialize_pairs(pairs),
        &line[block.bracket.end..]
    )
}

/// Sets `key` to `value` in block `block_id` on `line`, updating the property in place or
/// appending it to the list. The bracket is re-serialized.
pub fn set_property(line: &str, block_id: &str, key: &str, value: &str) -> Option<String> {
    let blocks = codec::parse_blocks(line, 0);
    let block = find_block(&blocks, block_id)?;
    let mut pairs: Vec<(&str, &str)> = block
        .properties
        .iter()
        .map(|p| if p.key == key { (key, value) } else { p.pair() })
        .collect();
    if !block.has_key(key) {
        pairs.push((key, value));
    }
    Some(replace_bracket(line, block, pairs))
}

/// Removes `key` from block `block_id` on `line`. Removing the last property leaves the bare
/// `^id` marker.
pub fn remove_property(line: &str, block_id: &str, key: &str) -> Option<String> {
    let blocks = codec::parse_blocks(line, 0);
    let block = find_block(&blocks, block_id)?;
    if !block.has_key(key) {
        return None;
    }
    let pairs: Vec<(&str, &str)> = block
        .properties
        .iter()
        .filter(|p| p.key != key)
        .map(|p| p.pair())
        .collect();
    if pairs.is_empty() {
        return Some(format!(
            "{}^{}{}",
            &line[..block.range.start],
            block.block_id,
            &line[block.range.end..]
        ));
    }
    Some(replace_bracket(line, block, pairs))
}

/// Adds `key: value` to the first block on `line`, gives a bare `^id` marker its first property,
/// or appends ` ^block-id [key: value]` to a line with neither.
pub fn insert_block_property(line: &str, key: &str, value: &str) -> String {
    let blocks = codec::parse_blocks(line, 0);
    if let Some(block) = blocks.first() {
        let mut pairs: Vec<(&str, &str)> = block.properties.iter().map(|p| p.pair()).collect();
        pairs.push((key, value));
        return replace_bracket(line, block, pairs);
    }
    if let Some((_, marker)) = codec::bare_markers(line).into_iter().next() {
        return format!(
            "{} [{}: {}]{}",
            &line[..marker.end],
            key,
            value,
            &line[marker.end..]
        );
    }
    format!(
        "{} ^{} [{}: {}]",
        line.trim_end(),
        PLACEHOLDER_BLOCK_ID,
        key,
        value
    )
}

/// Appends ` ^<block_id> [k: v, ...]` rendered from `template` to `line`.
pub fn insert_template(line: &str, template: &PropertyTemplate, block_id: &str) -> String {
    format!("{} ^{} [{}]", line.trim_end(), block_id, template.render())
}

/// A random six character `[a-z0-9]` block id.
pub fn generate_block_id() -> Result<String, BlockPropsError> {
    let mut bytes = [0u8; BLOCK_ID_LEN];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| BlockPropsError::Custom(format!("No randomness for block id: {e}")))?;
    Ok(bytes
        .iter()
        .map(|b| BLOCK_ID_ALPHABET[*b as usize % BLOCK_ID_ALPHABET.len()] as char)
        .collect())
}

/// Rewrites `key` to `new_value` in every block listed in `results`.
///
/// Results are grouped by document in first-seen order. A document that cannot be read or written
/// counts all of its results as failed; a result whose line, block, or key is gone counts alone.
/// Processing always continues with the next document.
#[tracing::instrument(skip_all, fields(key = key, results = results.len()))]
pub async fn apply_bulk_edit<S: DocumentStore>(
    store: &S,
    results: &[QueryResult],
    key: &str,
    new_value: &str,
) -> BulkEditReport {
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: BTreeMap<&str, Vec<&QueryResult>> = BTreeMap::new();
    for result in results {
        let group = grouped.entry(result.path.as_str()).or_default();
        if group.is_empty() {
            order.push(result.path.as_str());
        }
        group.push(result);
    }

    let mut report = BulkEditReport::default();
    for path in order {
        let Some(mut group) = grouped.remove(path) else {
            continue;
        };
        let count = group.len();
        let content = match store.read_fresh(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Bulk edit cannot read {}: {}", path, e);
                report.failed += count;
                continue;
            }
        };

        let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        group.sort_by(|a, b| b.line.cmp(&a.line));
        let mut updated = 0;
        let mut missed = 0;
        for result in group {
            let rewritten = lines.get(result.line).and_then(|line| {
                rewrite_property_in_line(line, &result.block_id, key, new_value)
            });
            match rewritten {
                Some(line) => {
                    lines[result.line] = line;
                    updated += 1;
                }
                None => {
                    tracing::debug!(
                        "Bulk edit lost ^{} at {}:{}",
                        result.block_id,
                        path,
                        result.line
                    );
                    missed += 1;
                }
            }
        }

        if updated == 0 {
            report.failed += missed;
            continue;
        }
        match store.write(path, lines.join("\n")).await {
            Ok(()) => {
                report.success += updated;
                report.failed += missed;
            }
            Err(e) => {
                tracing::warn!("Bulk edit cannot write {}: {}", path, e);
                report.failed += count;
            }
        }
    }
    tracing::info!("Bulk edit of {:?}: {}", key, report);
    report
}
