//! # Suggestions
//!
//! Frequency-ranked completion for property keys, values, note links and block references.
//!
//! Counts come from a [`SuggestionCache`] built by a full corpus scan. The cache lives for a
//! fixed time-to-live and is then rebuilt wholesale; it is never patched incrementally. Callers
//! that know the corpus changed underneath it (a bulk rewrite, for instance) call
//! [`Suggester::invalidate_cache`].
//!
//! ## Completion positions
//!
//! Given a line and a cursor inside an open property list:
//!
//! ```text
//! Task ^t1 [status: in-prog|         value of `status`, query "in-prog"
//! Task ^t1 [status: done, pri|       key, query "pri"
//! Task ^t1 [owner: [[Ali|            note link, query "Ali"
//! Task ^t1 [blocked-by: ^qa|         block reference, query "qa"
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tokio::time::Instant;

use crate::{
    codec,
    config::EngineConfig,
    error::BlockPropsError,
    store::{basename, DocumentStore},
};

pub const PRESET_KEY: &str = "preset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionKind {
    Key,
    Value,
    Template,
    NoteLink,
    BlockRef,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SuggestionKind::Key => write!(f, "key"),
            SuggestionKind::Value => write!(f, "value"),
            SuggestionKind::Template => write!(f, "template"),
            SuggestionKind::NoteLink => write!(f, "note"),
            SuggestionKind::BlockRef => write!(f, "block"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub text: String,
    /// Occurrences in the corpus, or the property count of a template.
    pub count: usize,
    /// Document path for note links and block references.
    pub path: Option<String>,
}

impl Suggestion {
    fn counted(kind: SuggestionKind, text: &str, count: usize) -> Self {
        Suggestion {
            kind,
            text: text.to_string(),
            count,
            path: None,
        }
    }
}

/// The text of a line and a byte offset into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionContext {
    pub line: String,
    pub cursor: usize,
}

impl CompletionContext {
    pub fn new(line: &str, cursor: usize) -> Self {
        CompletionContext {
            line: line.to_string(),
            cursor,
        }
    }

    /// Cursor at the end of `line`.
    pub fn at_end(line: &str) -> Self {
        Self::new(line, line.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionPosition {
    Key,
    Value {
        key: String,
        /// Value text typed so far, untrimmed.
        typed: String,
    },
}

/// Where a completion applies: the replacement range is `start..cursor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub start: usize,
    pub query: String,
    pub position: CompletionPosition,
}

/// Detects whether `ctx` sits inside a property list and what is being typed there.
///
/// The current segment starts after the last top-level comma; its first colon separates key from
/// value.
pub fn trigger(ctx: &CompletionContext) -> Option<Trigger> {
    let open = codec::open_property_list(&ctx.line, ctx.cursor)?;
    let typed = &ctx.line[open + 1..ctx.cursor];
    let segment_start = codec::top_level_commas(typed)
        .last()
        .map_or(0, |comma| comma + 1);
    let segment = &typed[segment_start..];

    match segment.find(':') {
        Some(colon) => {
            let value = &segment[colon + 1..];
            Some(Trigger {
                start: open + 1 + segment_start + colon + 1,
                query: value.trim().to_string(),
                position: CompletionPosition::Value {
                    key: segment[..colon].trim().to_string(),
                    typed: value.to_string(),
                },
            })
        }
        None => Some(Trigger {
            start: open + 1 + segment_start,
            query: segment.trim().to_string(),
            position: CompletionPosition::Key,
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkContext {
    Note(String),
    Block(String),
}

/// An unclosed `[[` wins over a trailing `^word`.
fn link_context(typed: &str) -> Option<LinkContext> {
    if let Some(idx) = typed.rfind("[[") {
        let after = &typed[idx + 2..];
        if !after.contains("]]") {
            return Some(LinkContext::Note(after.trim().to_string()));
        }
    }
    let idx = typed.rfind('^')?;
    let after = &typed[idx + 1..];
    after
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        .then(|| LinkContext::Block(after.to_string()))
}

/// Corpus-wide counts used for completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionCache {
    pub key_counts: BTreeMap<String, usize>,
    pub value_counts_by_key: BTreeMap<String, BTreeMap<String, usize>>,
    /// Block id to the first document defining it.
    pub block_locations: BTreeMap<String, String>,
}

impl SuggestionCache {
    /// Full scan of the store. Unreadable documents are skipped.
    #[tracing::instrument(skip_all)]
    pub async fn build<S: DocumentStore>(store: &S) -> Result<Self, BlockPropsError> {
        let mut cache = SuggestionCache::default();
        for path in store.list_documents().await? {
            match store.read(&path).await {
                Ok(content) => cache.add_document(&path, &content),
                Err(e) => tracing::debug!("Suggestion scan skipping {}: {}", path, e),
            }
        }
        tracing::debug!(
            "Suggestion cache built: {} keys, {} block ids",
            cache.key_counts.len(),
            cache.block_locations.len()
        );
        Ok(cache)
    }

    pub fn add_document(&mut self, path: &str, content: &str) {
        for line in content.split('\n') {
            for block in codec::parse_blocks(line, 0) {
                self.block_locations
                    .entry(block.block_id.clone())
                    .or_insert_with(|| path.to_string());
                for property in block.properties {
                    *self.key_counts.entry(property.key.clone()).or_default() += 1;
                    *self
                        .value_counts_by_key
                        .entry(property.key)
                        .or_default()
                        .entry(property.value)
                        .or_default() += 1;
                }
            }
            for id in codec::bare_block_ids(line) {
                self.block_locations
                    .entry(id)
                    .or_insert_with(|| path.to_string());
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.key_counts.keys()
    }
}

/// Entries of `counts` containing `query` (case-insensitive), most frequent first.
fn ranked(
    counts: &BTreeMap<String, usize>,
    query: &str,
    kind: SuggestionKind,
    limit: usize,
) -> Vec<Suggestion> {
    let query = query.to_lowercase();
    let mut matches: Vec<Suggestion> = counts
        .iter()
        .filter(|(text, _)| text.to_lowercase().contains(&query))
        .map(|(text, count)| Suggestion::counted(kind, text, *count))
        .collect();
    matches.sort_by(|a, b| b.count.cmp(&a.count));
    matches.truncate(limit);
    matches
}

struct CacheState {
    built_at: Instant,
    cache: Arc<SuggestionCache>,
}

/// Owns the suggestion cache and answers completion requests against a store.
pub struct Suggester<S> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    state: RwLock<Option<CacheState>>,
}

impl<S: DocumentStore> Suggester<S> {
    pub fn new(store: Arc<S>, config: Arc<EngineConfig>) -> Self {
        Suggester {
            store,
            config,
            state: RwLock::new(None),
        }
    }

    /// Returns the cache, rebuilding it first when it is missing or older than the TTL.
    pub async fn update_cache(&self) -> Result<Arc<SuggestionCache>, BlockPropsError> {
        let ttl = self.config.suggestion_ttl();
        let fresh = self
            .state
            .read()
            .as_ref()
            .filter(|state| state.built_at.elapsed() < ttl)
            .map(|state| state.cache.clone());
        if let Some(cache) = fresh {
            return Ok(cache);
        }
        let cache = Arc::new(SuggestionCache::build(self.store.as_ref()).await?);
        *self.state.write() = Some(CacheState {
            built_at: Instant::now(),
            cache: cache.clone(),
        });
        Ok(cache)
    }

    /// Forces the next [`Suggester::update_cache`] to rebuild.
    pub fn invalidate_cache(&self) {
        tracing::debug!("Suggestion cache invalidated");
        *self.state.write() = None;
    }

    /// Suggestions for the completion at `ctx`. Never fails: an unusable context, a scan error
    /// or an unmatched query all yield an empty list.
    pub async fn get_suggestions(&self, ctx: &CompletionContext) -> Vec<Suggestion> {
        let Some(trigger) = trigger(ctx) else {
            return Vec::new();
        };
        let cache = match self.update_cache().await {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("Suggestion cache unavailable: {}", e);
                return Vec::new();
            }
        };
        match trigger.position {
            CompletionPosition::Key => self.key_suggestions(&cache, &trigger.query),
            CompletionPosition::Value { key, typed } => match link_context(&typed) {
                Some(LinkContext::Note(query)) => self.note_suggestions(&query).await,
                Some(LinkContext::Block(query)) => self.block_suggestions(&cache, &query),
                None if key == PRESET_KEY && self.config.enable_presets => {
                    self.template_suggestions(&trigger.query)
                }
                None => cache
                    .value_counts_by_key
                    .get(&key)
                    .map(|values| {
                        ranked(
                            values,
                            &trigger.query,
                            SuggestionKind::Value,
                            self.config.max_suggestions,
                        )
                    })
                    .unwrap_or_default(),
            },
        }
    }

    fn key_suggestions(&self, cache: &SuggestionCache, query: &str) -> Vec<Suggestion> {
        let mut suggestions = ranked(
            &cache.key_counts,
            query,
            SuggestionKind::Key,
            self.config.max_suggestions,
        );
        if self.config.presets_active()
            && PRESET_KEY.contains(query.to_lowercase().as_str())
            && !suggestions.iter().any(|s| s.text == PRESET_KEY)
        {
            suggestions.insert(
                0,
                Suggestion::counted(SuggestionKind::Key, PRESET_KEY, self.config.templates.len()),
            );
        }
        suggestions
    }

    fn template_suggestions(&self, query: &str) -> Vec<Suggestion> {
        let query = query.to_lowercase();
        self.config
            .templates
            .iter()
            .filter(|t| t.name.to_lowercase().contains(&query))
            .map(|t| Suggestion::counted(SuggestionKind::Template, &t.name, t.properties.len()))
            .collect()
    }

    async fn note_suggestions(&self, query: &str) -> Vec<Suggestion> {
        let documents = match self.store.list_documents().await {
            Ok(documents) => documents,
            Err(e) => {
                tracing::warn!("Cannot list documents for note suggestions: {}", e);
                return Vec::new();
            }
        };
        let query = query.to_lowercase();
        documents
            .iter()
            .filter(|path| basename(path).to_lowercase().contains(&query))
            .take(self.config.max_suggestions)
            .map(|path| Suggestion {
                kind: SuggestionKind::NoteLink,
                text: basename(path).to_string(),
                count: 0,
                path: Some(path.clone()),
            })
            .collect()
    }

    fn block_suggestions(&self, cache: &SuggestionCache, query: &str) -> Vec<Suggestion> {
        let query = query.to_lowercase();
        cache
            .block_locations
            .iter()
            .filter(|(id, _)| id.to_lowercase().contains(&query))
            .take(self.config.max_suggestions)
            .map(|(id, path)| Suggestion {
                kind: SuggestionKind::BlockRef,
                text: id.clone(),
                count: 0,
                path: Some(path.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        properties::{PropertyTemplate, TemplateProperty},
        store::MemoryStore,
    };
    use std::time::Duration;
    use test_log::test;

    fn texts(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.text.as_str()).collect()
    }

    fn suggester(
        docs: &[(&str, &str)],
        config: EngineConfig,
    ) -> (Arc<MemoryStore>, Suggester<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_documents(docs.iter().copied()));
        (store.clone(), Suggester::new(store, Arc::new(config)))
    }

    fn task_template() -> PropertyTemplate {
        PropertyTemplate {
            name: "task".to_string(),
            properties: vec![TemplateProperty {
                key: "status".to_string(),
                value: "todo".to_string(),
            }],
        }
    }

    #[test]
    fn test_trigger_positions() {
        let t = trigger(&CompletionContext::at_end("Task ^t1 [status: in-prog")).unwrap();
        assert_eq!(t.query, "in-prog");
        assert_eq!(t.start, 17);
        assert_eq!(
            t.position,
            CompletionPosition::Value {
                key: "status".into(),
                typed: " in-prog".into()
            }
        );

        let t = trigger(&CompletionContext::at_end("^t1 [status: done, pri")).unwrap();
        assert_eq!(t.position, CompletionPosition::Key);
        assert_eq!(t.query, "pri");
        assert_eq!(t.start, 18);

        let t = trigger(&CompletionContext::at_end("^t1 [time: 10:3")).unwrap();
        assert_eq!(t.query, "10:3");

        let t = trigger(&CompletionContext::at_end("^t1 [owner: [[Alice, Bo")).unwrap();
        assert!(matches!(t.position, CompletionPosition::Value { ref key, .. } if key == "owner"));

        assert!(trigger(&CompletionContext::at_end("plain [status: ")).is_none());
        assert!(trigger(&CompletionContext::at_end("^t1 [status: done] ")).is_none());
        assert!(trigger(&CompletionContext::new("^t1 [status", 2)).is_none());
    }

    #[test]
    fn test_link_context_detection() {
        assert_eq!(link_context(" [[Ali"), Some(LinkContext::Note("Ali".into())));
        assert_eq!(link_context(" [[Alice]] ^q"), Some(LinkContext::Block("q".into())));
        assert_eq!(link_context(" ^"), Some(LinkContext::Block(String::new())));
        assert_eq!(link_context(" ^a b"), None);
        assert_eq!(link_context(" [[Alice]]"), None);
    }

    #[test]
    fn test_cache_counts_and_first_location() {
        let mut cache = SuggestionCache::default();
        cache.add_document("a.md", "^x [status: todo]\n^y [status: done, due: fri]\nbare ^z");
        cache.add_document("b.md", "^x [status: todo]\n^w [k: v]");
        assert_eq!(cache.key_counts["status"], 3);
        assert_eq!(cache.value_counts_by_key["status"]["todo"], 2);
        assert_eq!(cache.block_locations["x"], "a.md");
        assert_eq!(cache.block_locations["z"], "a.md");
        assert_eq!(cache.block_locations["w"], "b.md");
    }

    #[test(tokio::test)]
    async fn test_key_ranking_by_frequency() {
        let mut content = String::new();
        for n in 0..5 {
            content.push_str(&format!("^p{n} [priority: high]\n"));
        }
        content.push_str("^q [price: 3]\n");
        let (_store, suggester) = suggester(&[("a.md", &content)], EngineConfig::default());

        let found = suggester
            .get_suggestions(&CompletionContext::at_end("^new [pri"))
            .await;
        assert_eq!(texts(&found), vec!["priority", "price"]);
        assert_eq!(found[0].count, 5);
        assert_eq!(found[0].kind, SuggestionKind::Key);
    }

    #[test(tokio::test)]
    async fn test_value_and_preset_suggestions() {
        let config = EngineConfig {
            templates: vec![task_template()],
            ..Default::default()
        };
        let (_store, suggester) = suggester(
            &[("a.md", "^a [status: todo]\n^b [status: todo]\n^c [status: done]")],
            config,
        );

        let values = suggester
            .get_suggestions(&CompletionContext::at_end("^n [status: "))
            .await;
        assert_eq!(texts(&values), vec!["todo", "done"]);

        let keys = suggester
            .get_suggestions(&CompletionContext::at_end("^n [pre"))
            .await;
        assert_eq!(texts(&keys), vec!["preset"]);

        let keys = suggester
            .get_suggestions(&CompletionContext::at_end("^n ["))
            .await;
        assert_eq!(texts(&keys), vec!["preset", "status"]);

        let templates = suggester
            .get_suggestions(&CompletionContext::at_end("^n [preset: ta"))
            .await;
        assert_eq!(templates[0].kind, SuggestionKind::Template);
        assert_eq!(texts(&templates), vec!["task"]);

        assert!(suggester
            .get_suggestions(&CompletionContext::at_end("^n [status: zzz"))
            .await
            .is_empty());
        assert!(suggester
            .get_suggestions(&CompletionContext::at_end("^n [nokey: "))
            .await
            .is_empty());
    }

    #[test(tokio::test)]
    async fn test_link_suggestions() {
        let (_store, suggester) = suggester(
            &[
                ("people/Alice.md", "^alice-card [role: lead]"),
                ("people/Bob.md", "bare ^bob-note"),
                ("Plan.md", "^plan [owner: [[Alice]]]"),
            ],
            EngineConfig::default(),
        );

        let notes = suggester
            .get_suggestions(&CompletionContext::at_end("^t [owner: [[al"))
            .await;
        assert_eq!(texts(&notes), vec!["Alice"]);
        assert_eq!(notes[0].path.as_deref(), Some("people/Alice.md"));

        let blocks = suggester
            .get_suggestions(&CompletionContext::at_end("^t [after: ^b"))
            .await;
        assert_eq!(texts(&blocks), vec!["bob-note"]);
        assert_eq!(blocks[0].path.as_deref(), Some("people/Bob.md"));
    }

    #[test(tokio::test(start_paused = true))]
    async fn test_cache_ttl_and_invalidation() {
        let (store, suggester) =
            suggester(&[("a.md", "^a [status: todo]")], EngineConfig::default());
        let ctx = CompletionContext::at_end("^n [status: ");
        assert_eq!(texts(&suggester.get_suggestions(&ctx).await), vec!["todo"]);

        store.insert("a.md", "^a [status: done]");
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(texts(&suggester.get_suggestions(&ctx).await), vec!["todo"]);

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(texts(&suggester.get_suggestions(&ctx).await), vec!["done"]);

        store.insert("a.md", "^a [status: blocked]");
        suggester.invalidate_cache();
        assert_eq!(texts(&suggester.get_suggestions(&ctx).await), vec!["blocked"]);
    }
}
