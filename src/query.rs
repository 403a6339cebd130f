//! Corpus queries over raw property values.
//!
//! Queries parse every document afresh instead of consulting the backlink index: value equality
//! (`status = done`) is a question about raw property text, not about the link graph.

use serde::{Deserialize, Serialize};

use crate::{
    codec,
    error::BlockPropsError,
    properties::{Block, Property},
    store::DocumentStore,
};

/// A `key` / optional `value` filter. An empty value matches any value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyQuery {
    pub key: String,
    pub value: Option<String>,
}

impl PropertyQuery {
    pub fn new(key: &str, value: Option<&str>) -> Self {
        PropertyQuery {
            key: key.to_string(),
            value: value.filter(|v| !v.is_empty()).map(str::to_string),
        }
    }

    pub fn matches_property(&self, property: &Property) -> bool {
        property.key == self.key
            && self
                .value
                .as_deref()
                .is_none_or(|value| property.value == value)
    }

    pub fn matches(&self, block: &Block) -> bool {
        block.properties.iter().any(|p| self.matches_property(p))
    }
}

impl std::fmt::Display for PropertyQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}: {}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub path: String,
    /// Zero-based line of the block.
    pub line: usize,
    pub block_id: String,
    pub properties: Vec<Property>,
    /// Line text before the block marker, trimmed and truncated.
    pub context: String,
}

impl QueryResult {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }
}

/// Matching blocks of one document, in line order.
pub fn search_content(
    path: &str,
    content: &str,
    query: &PropertyQuery,
    context_len: usize,
) -> Vec<QueryResult> {
    let mut results = Vec::new();
    for line in codec::lines(content) {
        for block in line.blocks.iter().filter(|b| query.matches(b)) {
            results.push(QueryResult {
                path: path.to_string(),
                line: line.line,
                block_id: block.block_id.clone(),
                properties: block.properties.clone(),
                context: codec::context_before(line.text, block, context_len),
            });
        }
    }
    results
}

/// Every block in the corpus matching `query`, in document listing order then line order.
///
/// Documents that cannot be read are skipped with a warning.
#[tracing::instrument(skip_all, fields(query = %query))]
pub async fn search<S: DocumentStore>(
    store: &S,
    query: &PropertyQuery,
    context_len: usize,
) -> Result<Vec<QueryResult>, BlockPropsError> {
    let mut results = Vec::new();
    for path in store.list_documents().await? {
        match store.read(&path).await {
            Ok(content) => results.extend(search_content(&path, &content, query, context_len)),
            Err(e) => tracing::warn!("Skipping {} during search: {}", path, e),
        }
    }
    tracing::debug!("{} blocks matched", results.len());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use test_log::test;

    #[test]
    fn test_query_normalizes_empty_value() {
        assert_eq!(PropertyQuery::new("status", Some("")).value, None);
        assert_eq!(PropertyQuery::new("status", Some("")).to_string(), "status");
        assert_eq!(
            PropertyQuery::new("status", Some("done")).to_string(),
            "status: done"
        );
    }

    #[test]
    fn test_search_content_scenario() {
        let results = search_content(
            "A.md",
            "Intro\nWrite the docs ^t1 [status: todo, priority: high]",
            &PropertyQuery::new("status", None),
            60,
        );
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.block_id, "t1");
        assert_eq!(result.line, 1);
        assert_eq!(result.context, "Write the docs");
        let pairs: Vec<(&str, &str)> = result.properties.iter().map(Property::pair).collect();
        assert_eq!(pairs, vec![("status", "todo"), ("priority", "high")]);
        assert_eq!(result.get("priority"), Some("high"));
    }

    #[test]
    fn test_value_must_match_exactly() {
        let content = "^a [status: done]\n^b [status: Done]\n^c [state: done]";
        let query = PropertyQuery::new("status", Some("done"));
        let results = search_content("x.md", content, &query, 60);
        let ids: Vec<&str> = results.iter().map(|r| r.block_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test(tokio::test)]
    async fn test_search_across_documents() {
        let store = MemoryStore::with_documents([
            ("one.md", "^a [status: done]\n^b [status: todo]\n^c [status: done]"),
            ("two.md", "text ^d [status: done, owner: [[Alice]]]"),
            ("three.md", "no blocks here"),
        ]);
        let results = search(&store, &PropertyQuery::new("status", Some("done")), 60)
            .await
            .unwrap();
        let found: Vec<(&str, &str)> = results
            .iter()
            .map(|r| (r.path.as_str(), r.block_id.as_str()))
            .collect();
        assert_eq!(found, vec![("one.md", "a"), ("one.md", "c"), ("two.md", "d")]);
        assert_eq!(results[2].context, "text");
    }
}
