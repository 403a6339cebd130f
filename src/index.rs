//! # Backlink index
//!
//! A corpus-wide reverse index from link target to the property occurrences that reference it.
//!
//! Targets are normalized before they become keys:
//!
//! | Link | Key |
//! |---|---|
//! | `[[Plan]]`, `[[Plan#Goals]]` | `Plan.md` |
//! | `[[notes/Plan.md]]` | `notes/Plan.md` |
//! | `[[#Goals]]` in `notes/Plan.md` | `notes/Plan.md` |
//! | `^task-1` | `^task-1` |
//!
//! [`BacklinkIndexer`] owns the map behind a shared lock and maintains it from a
//! [`DocumentStore`]. Debounced maintenance driven by [`DocumentEvent`](crate::event::DocumentEvent)s
//! lives in [`crate::watch`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    codec,
    error::BlockPropsError,
    event::IndexEvent,
    properties::LinkKind,
    store::{basename, link_path, with_extension, DocumentStore},
};

/// One occurrence of a link inside a property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BacklinkEntry {
    pub source_path: String,
    pub source_block_id: String,
    pub key: String,
    /// Zero-based line of the referencing block.
    pub line: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub targets: usize,
    pub total_backlinks: usize,
}

/// Outcome of a full [`BacklinkIndexer::build_index`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub documents: usize,
    /// Documents that could not be read and were left out.
    pub failed: usize,
    pub stats: IndexStats,
}

/// Key under which links to the note `target` are stored.
pub fn note_target_key(target: &str, extension: &str) -> String {
    with_extension(link_path(target), extension)
}

pub fn block_target_key(block_id: &str) -> String {
    format!("^{}", block_id.trim_start_matches('^'))
}

/// Every `(target key, entry)` pair implied by the content of the document at `path`.
pub fn document_entries(
    path: &str,
    content: &str,
    extension: &str,
) -> Vec<(String, BacklinkEntry)> {
    let mut entries = Vec::new();
    for line in codec::lines(content) {
        for block in &line.blocks {
            for property in &block.properties {
                for link in &property.parsed.links {
                    let target = match link.kind {
                        LinkKind::Note if link_path(&link.target).is_empty() => path.to_string(),
                        LinkKind::Note => note_target_key(&link.target, extension),
                        LinkKind::Block => block_target_key(&link.target),
                    };
                    entries.push((
                        target,
                        BacklinkEntry {
                            source_path: path.to_string(),
                            source_block_id: block.block_id.clone(),
                            key: property.key.clone(),
                            line: line.line,
                        },
                    ));
                }
            }
        }
    }
    entries
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklinkIndex(BTreeMap<String, Vec<BacklinkEntry>>);

impl BacklinkIndex {
    pub fn get(&self, target: &str) -> &[BacklinkEntry] {
        self.0.get(target).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn insert(&mut self, target: String, entry: BacklinkEntry) {
        self.0.entry(target).or_default().push(entry);
    }

    /// Drops every entry sourced from `path`, and any bucket left empty. Returns the number of
    /// entries removed.
    pub fn remove_source(&mut self, path: &str) -> usize {
        let mut removed = 0;
        self.0.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.source_path != path);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    pub fn targets(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<BacklinkEntry>)> {
        self.0.iter()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            targets: self.0.len(),
            total_backlinks: self.0.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Clears the rebuilding flag when a build ends, however it ends.
struct RebuildGuard<'a>(&'a AtomicBool);

impl<'a> RebuildGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RebuildGuard(flag))
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Builds and maintains a [`BacklinkIndex`] over a [`DocumentStore`].
///
/// Cloning is cheap and every clone shares the same index.
pub struct BacklinkIndexer<S> {
    store: Arc<S>,
    index: Arc<RwLock<BacklinkIndex>>,
    rebuilding: Arc<AtomicBool>,
    extension: String,
    events: Option<UnboundedSender<IndexEvent>>,
}

impl<S> Clone for BacklinkIndexer<S> {
    fn clone(&self) -> Self {
        BacklinkIndexer {
            store: self.store.clone(),
            index: self.index.clone(),
            rebuilding: self.rebuilding.clone(),
            extension: self.extension.clone(),
            events: self.events.clone(),
        }
    }
}

impl<S: DocumentStore> BacklinkIndexer<S> {
    pub fn new(store: Arc<S>, extension: &str) -> Self {
        BacklinkIndexer {
            store,
            index: Arc::new(RwLock::new(BacklinkIndex::default())),
            rebuilding: Arc::new(AtomicBool::new(false)),
            extension: extension.to_string(),
            events: None,
        }
    }

    /// Sends an [`IndexEvent`] to `tx` whenever the index changes.
    pub fn with_events(mut self, tx: UnboundedSender<IndexEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn emit(&self, event: IndexEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                tracing::trace!("index event receiver dropped");
            }
        }
    }

    /// Rebuilds the whole index from the store.
    ///
    /// Returns `None` without touching the index when another build is already running.
    /// Unreadable documents are logged and counted in the summary.
    #[tracing::instrument(skip_all)]
    pub async fn build_index(&self) -> Result<Option<BuildSummary>, BlockPropsError> {
        let Some(_guard) = RebuildGuard::acquire(&self.rebuilding) else {
            tracing::debug!("index build already in flight, skipping");
            return Ok(None);
        };

        let documents = self.store.list_documents().await?;
        let mut fresh = BacklinkIndex::default();
        let mut failed = 0;
        for path in documents.iter() {
            match self.store.read(path).await {
                Ok(content) => {
                    for (target, entry) in document_entries(path, &content, &self.extension) {
                        fresh.insert(target, entry);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping {} while building backlink index: {}", path, e);
                    failed += 1;
                }
            }
        }

        let stats = fresh.stats();
        *self.index.write() = fresh;
        tracing::info!(
            "Indexed {} documents ({} failed): {} targets, {} backlinks",
            documents.len(),
            failed,
            stats.targets,
            stats.total_backlinks
        );
        self.emit(IndexEvent::Updated);
        Ok(Some(BuildSummary {
            documents: documents.len(),
            failed,
            stats,
        }))
    }

    /// Re-indexes one document, replacing every entry previously sourced from it.
    ///
    /// When the document cannot be read its old entries are dropped and the error is returned.
    pub async fn index_document(&self, path: &str) -> Result<usize, BlockPropsError> {
        let content = match self.store.read(path).await {
            Ok(content) => content,
            Err(e) => {
                self.index.write().remove_source(path);
                return Err(e);
            }
        };
        let entries = document_entries(path, &content, &self.extension);
        let count = entries.len();
        {
            let mut index = self.index.write();
            index.remove_source(path);
            for (target, entry) in entries {
                index.insert(target, entry);
            }
        }
        tracing::debug!("Re-indexed {} ({} backlinks)", path, count);
        self.emit(IndexEvent::Reindexed(path.to_string()));
        Ok(count)
    }

    /// Drops every entry sourced from `path`.
    pub fn remove_document(&self, path: &str) -> usize {
        let removed = self.index.write().remove_source(path);
        tracing::debug!("Removed {} backlinks sourced from {}", removed, path);
        self.emit(IndexEvent::Updated);
        removed
    }

    pub fn backlinks_for_block(&self, block_id: &str) -> Vec<BacklinkEntry> {
        self.index.read().get(&block_target_key(block_id)).to_vec()
    }

    /// Backlinks to a note, consulting both the full path key and the bare `basename.md` key
    /// that `[[Name]]` links are stored under.
    pub fn backlinks_for_note(&self, path: &str) -> Vec<BacklinkEntry> {
        let full = note_target_key(path, &self.extension);
        let short = with_extension(basename(&full), &self.extension);
        let index = self.index.read();
        let mut entries = index.get(&full).to_vec();
        if short != full {
            for entry in index.get(&short) {
                if !entries.contains(entry) {
                    entries.push(entry.clone());
                }
            }
        }
        entries
    }

    /// Backlinks to the document at `path` and to every block it defines, keyed by label: the
    /// document's basename for note-level links, `^id` for each block.
    pub async fn backlinks_for_document(
        &self,
        path: &str,
    ) -> Result<BTreeMap<String, Vec<BacklinkEntry>>, BlockPropsError> {
        let mut result = BTreeMap::new();
        let note = self.backlinks_for_note(path);
        if !note.is_empty() {
            result.insert(basename(path).to_string(), note);
        }

        let content = self.store.read(path).await?;
        for block_id in codec::block_ids(&content) {
            let entries = self.backlinks_for_block(&block_id);
            if !entries.is_empty() {
                result.insert(block_target_key(&block_id), entries);
            }
        }
        Ok(result)
    }

    pub fn stats(&self) -> IndexStats {
        self.index.read().stats()
    }

    /// A copy of the current index.
    pub fn snapshot(&self) -> BacklinkIndex {
        self.index.read().clone()
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }
}
