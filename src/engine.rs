//! # PropertyEngine
//!
//! The single handle a host holds. It owns the backlink index (through its [`IndexWatcher`]), the
//! suggestion cache, and the configuration, and forwards every operation to the module that
//! implements it.
//!
//! ```rust,no_run
//! use blockprops::{config::EngineConfig, store::FsStore, PropertyEngine};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), blockprops::BlockPropsError> {
//! let store = Arc::new(FsStore::new("./notes")?);
//! let engine = PropertyEngine::new(store, EngineConfig::default());
//! engine.start().await?;
//!
//! for result in engine.search("status", Some("todo")).await? {
//!     println!("{}:{} ^{}", result.path, result.line, result.block_id);
//! }
//! engine.teardown();
//! # Ok(())
//! # }
//! ```

use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    config::EngineConfig,
    edit::{self, BulkEditReport},
    error::{BlockPropsError, BulkEditRejection},
    event::{DocumentEvent, IndexEvent},
    graph::{self, BlockGraph},
    index::{BacklinkEntry, BacklinkIndexer, BuildSummary, IndexStats},
    properties::Link,
    query::{self, PropertyQuery, QueryResult},
    resolve::{self, ResolvedLink},
    store::DocumentStore,
    suggest::{CompletionContext, Suggester, Suggestion},
    watch::IndexWatcher,
};

pub struct PropertyEngine<S> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    watcher: IndexWatcher<S>,
    suggester: Suggester<S>,
}

impl<S: DocumentStore> PropertyEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let indexer = BacklinkIndexer::new(store.clone(), &config.default_extension);
        Self::from_indexer(store, config, indexer)
    }

    /// Like [`PropertyEngine::new`], reporting index changes to `tx`.
    pub fn with_events(
        store: Arc<S>,
        config: EngineConfig,
        tx: UnboundedSender<IndexEvent>,
    ) -> Self {
        let indexer =
            BacklinkIndexer::new(store.clone(), &config.default_extension).with_events(tx);
        Self::from_indexer(store, config, indexer)
    }

    fn from_indexer(store: Arc<S>, config: EngineConfig, indexer: BacklinkIndexer<S>) -> Self {
        let config = Arc::new(config);
        PropertyEngine {
            watcher: IndexWatcher::new(indexer, config.debounce()),
            suggester: Suggester::new(store.clone(), config.clone()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn indexer(&self) -> &BacklinkIndexer<S> {
        self.watcher.indexer()
    }

    /// Builds the index, then keeps it live from the store's change events.
    pub async fn start(&self) -> Result<Option<BuildSummary>, BlockPropsError> {
        let summary = self.build_index().await?;
        self.watcher.listen(self.store.subscribe()?);
        Ok(summary)
    }

    /// Applies a change event pushed by the host instead of a store subscription.
    pub fn handle_event(&self, event: DocumentEvent) {
        self.watcher.handle_event(event);
    }

    /// Stops the event loop and cancels every pending re-index.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }

    pub async fn build_index(&self) -> Result<Option<BuildSummary>, BlockPropsError> {
        self.indexer().build_index().await
    }

    pub async fn index_document(&self, path: &str) -> Result<usize, BlockPropsError> {
        self.indexer().index_document(path).await
    }

    pub fn backlinks_for_block(&self, block_id: &str) -> Vec<BacklinkEntry> {
        self.indexer().backlinks_for_block(block_id)
    }

    pub fn backlinks_for_note(&self, path: &str) -> Vec<BacklinkEntry> {
        self.indexer().backlinks_for_note(path)
    }

    pub async fn backlinks_for_document(
        &self,
        path: &str,
    ) -> Result<BTreeMap<String, Vec<BacklinkEntry>>, BlockPropsError> {
        self.indexer().backlinks_for_document(path).await
    }

    pub fn stats(&self) -> IndexStats {
        self.indexer().stats()
    }

    pub async fn search(
        &self,
        key: &str,
        value: Option<&str>,
    ) -> Result<Vec<QueryResult>, BlockPropsError> {
        let query = PropertyQuery::new(key, value);
        query::search(self.store.as_ref(), &query, self.config.context_len).await
    }

    pub async fn get_suggestions(&self, ctx: &CompletionContext) -> Vec<Suggestion> {
        self.suggester.get_suggestions(ctx).await
    }

    pub fn invalidate_cache(&self) {
        self.suggester.invalidate_cache();
    }

    pub async fn resolve_note_link(
        &self,
        target: &str,
        source: &str,
    ) -> Result<Option<ResolvedLink>, BlockPropsError> {
        resolve::resolve_note_link(self.store.as_ref(), target, source).await
    }

    pub async fn resolve_block_ref(
        &self,
        block_id: &str,
        current: Option<&str>,
    ) -> Result<Option<ResolvedLink>, BlockPropsError> {
        resolve::resolve_block_ref(
            self.store.as_ref(),
            block_id,
            current,
            self.config.search_corpus,
        )
        .await
    }

    pub async fn navigate(
        &self,
        link: &Link,
        source: &str,
        current: Option<&str>,
    ) -> Result<Option<ResolvedLink>, BlockPropsError> {
        resolve::navigate(
            self.store.as_ref(),
            link,
            source,
            current,
            self.config.search_corpus,
        )
        .await
    }

    pub async fn all_block_ids(&self) -> Result<BTreeMap<String, String>, BlockPropsError> {
        resolve::all_block_ids(self.store.as_ref()).await
    }

    /// The blocks a bulk edit of `key` would touch, optionally narrowed to one current value.
    pub async fn preview_bulk_edit(
        &self,
        key: &str,
        filter: Option<&str>,
    ) -> Result<Vec<QueryResult>, BlockPropsError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(BulkEditRejection::NoKey.into());
        }
        self.search(key, filter).await
    }

    /// Rewrites `key` to `new_value` in every previewed block, then invalidates the suggestion
    /// cache.
    ///
    /// Rejected before any write when the key or value is empty, when there is nothing to
    /// update, or when every previewed block already holds `new_value`.
    pub async fn apply_bulk_edit(
        &self,
        results: &[QueryResult],
        key: &str,
        new_value: &str,
    ) -> Result<BulkEditReport, BlockPropsError> {
        let key = key.trim();
        let new_value = new_value.trim();
        if key.is_empty() {
            return Err(BulkEditRejection::NoKey.into());
        }
        if results.is_empty() {
            return Err(BulkEditRejection::NoMatches.into());
        }
        if new_value.is_empty() {
            return Err(BulkEditRejection::NoNewValue.into());
        }
        if results.iter().all(|r| r.get(key) == Some(new_value)) {
            return Err(BulkEditRejection::Unchanged.into());
        }
        let report = edit::apply_bulk_edit(self.store.as_ref(), results, key, new_value).await;
        self.invalidate_cache();
        Ok(report)
    }

    /// `line` with the named template appended as a new block under a generated id. `None` when
    /// no such template is configured.
    pub fn insert_template(
        &self,
        line: &str,
        name: &str,
    ) -> Result<Option<String>, BlockPropsError> {
        let Some(template) = self.config.template(name) else {
            return Ok(None);
        };
        let block_id = edit::generate_block_id()?;
        Ok(Some(edit::insert_template(line, template, &block_id)))
    }

    pub async fn build_graph(&self) -> Result<BlockGraph, BlockPropsError> {
        graph::build_graph(self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        properties::{PropertyTemplate, TemplateProperty},
        store::MemoryStore,
    };
    use test_log::test;

    fn engine() -> PropertyEngine<MemoryStore> {
        let store = Arc::new(MemoryStore::with_documents([
            ("a.md", "^x [status: todo]\n^y [status: todo, next: ^x]"),
            ("b.md", "^z [status: todo, see: [[a]]]"),
        ]));
        let config = EngineConfig {
            templates: vec![PropertyTemplate {
                name: "task".into(),
                properties: vec![TemplateProperty {
                    key: "status".into(),
                    value: "todo".into(),
                }],
            }],
            ..EngineConfig::default()
        };
        PropertyEngine::new(store, config)
    }

    #[test(tokio::test)]
    async fn test_bulk_edit_preconditions() {
        let engine = engine();
        let err = |e: BulkEditRejection| BlockPropsError::BulkEdit(e);
        assert_eq!(
            engine.preview_bulk_edit(" ", None).await.unwrap_err(),
            err(BulkEditRejection::NoKey)
        );
        let preview = engine.preview_bulk_edit("status", Some("todo")).await.unwrap();
        assert_eq!(preview.len(), 3);
        assert_eq!(
            engine.apply_bulk_edit(&[], "status", "done").await.unwrap_err(),
            err(BulkEditRejection::NoMatches)
        );
        assert_eq!(
            engine.apply_bulk_edit(&preview, "status", "").await.unwrap_err(),
            err(BulkEditRejection::NoNewValue)
        );
        assert_eq!(
            engine.apply_bulk_edit(&preview, "status", "todo").await.unwrap_err(),
            err(BulkEditRejection::Unchanged)
        );
        assert_eq!(
            engine.store().get("a.md").unwrap(),
            "^x [status: todo]\n^y [status: todo, next: ^x]"
        );
    }

    #[test(tokio::test)]
    async fn test_bulk_edit_refreshes_suggestions() {
        let engine = engine();
        let ctx = CompletionContext::at_end("^n [status: ");
        let before: Vec<String> = engine
            .get_suggestions(&ctx)
            .await
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(before, vec!["todo"]);

        let preview = engine.preview_bulk_edit("status", None).await.unwrap();
        let report = engine.apply_bulk_edit(&preview, "status", "done").await.unwrap();
        assert_eq!(report, BulkEditReport { success: 3, failed: 0 });

        let after: Vec<String> = engine
            .get_suggestions(&ctx)
            .await
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(after, vec!["done"]);
    }

    #[test(tokio::test)]
    async fn test_index_and_lookups() {
        let engine = engine();
        let summary = engine.build_index().await.unwrap().unwrap();
        assert_eq!(summary.documents, 2);
        assert_eq!(engine.backlinks_for_block("x")[0].source_block_id, "y");
        assert_eq!(engine.backlinks_for_note("a.md")[0].source_path, "b.md");
        assert_eq!(engine.stats().total_backlinks, 2);

        let found = engine.resolve_block_ref("^x", Some("b.md")).await.unwrap().unwrap();
        assert_eq!((found.path.as_str(), found.line), ("a.md", Some(0)));
        let graph = engine.build_graph().await.unwrap();
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_insert_named_template() {
        let engine = engine();
        let line = engine.insert_template("Call Bob", "task").unwrap().unwrap();
        let blocks = crate::codec::parse_blocks(&line, 0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block_id.len(), 6);
        assert_eq!(blocks[0].get("status").unwrap().value, "todo");
        assert_eq!(engine.insert_template("x", "missing").unwrap(), None);
    }
}
