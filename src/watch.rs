//! # Watch - keeping the backlink index live
//!
//! [`IndexWatcher`] applies [`DocumentEvent`]s to a [`BacklinkIndexer`]:
//!
//! | Event | Effect |
//! |---|---|
//! | `Modified(D)` | debounced re-index of `D` |
//! | `Deleted(D)` | entries sourced from `D` removed immediately |
//! | `Renamed(old, new)` | entries from `old` removed immediately, debounced re-index of `new` |
//!
//! ## Debouncing
//!
//! Each document gets at most one pending re-index task. A newer `Modified` for the same document
//! aborts the pending task and schedules a fresh one, so a burst of edits produces a single
//! re-index once the document has been quiet for the debounce window. Pending tasks are tagged
//! with a generation number; a finished task only clears its own generation from the pending map,
//! never a replacement scheduled after it.
//!
//! ## Shutdown
//!
//! [`IndexWatcher::teardown`] aborts the event loop and every pending task together.
//!
//! ```rust,no_run
//! use blockprops::{index::BacklinkIndexer, store::{DocumentStore, MemoryStore}, watch::IndexWatcher};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> Result<(), blockprops::BlockPropsError> {
//! let store = Arc::new(MemoryStore::new());
//! let indexer = BacklinkIndexer::new(store.clone(), "md");
//! let watcher = IndexWatcher::new(indexer, Duration::from_millis(500));
//! watcher.listen(store.subscribe()?);
//!
//! store.insert("a.md", "^a [next: ^b]");
//! // ... half a second later the index knows about ^a -> ^b
//! watcher.teardown();
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle, time::sleep};

use crate::{event::DocumentEvent, index::BacklinkIndexer, store::DocumentStore};

struct PendingIndex {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap = HashMap<String, PendingIndex>;

pub struct IndexWatcher<S> {
    indexer: BacklinkIndexer<S>,
    debounce: Duration,
    pending: Arc<Mutex<PendingMap>>,
    generation: Arc<AtomicU64>,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<S> Clone for IndexWatcher<S> {
    fn clone(&self) -> Self {
        IndexWatcher {
            indexer: self.indexer.clone(),
            debounce: self.debounce,
            pending: self.pending.clone(),
            generation: self.generation.clone(),
            listener: self.listener.clone(),
        }
    }
}

impl<S: DocumentStore> IndexWatcher<S> {
    pub fn new(indexer: BacklinkIndexer<S>, debounce: Duration) -> Self {
        IndexWatcher {
            indexer,
            debounce,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn indexer(&self) -> &BacklinkIndexer<S> {
        &self.indexer
    }

    /// Spawns the event loop over `events`, replacing any loop already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(&self, mut events: UnboundedReceiver<DocumentEvent>) {
        let watcher = self.clone();
        let handle = tokio::spawn(async move {
            tracing::debug!("[IndexWatcher] listening for document events");
            while let Some(event) = events.recv().await {
                watcher.handle_event(event);
            }
            tracing::debug!("[IndexWatcher] document event stream closed");
        });
        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn handle_event(&self, event: DocumentEvent) {
        tracing::debug!("[IndexWatcher] {}", event);
        match event {
            DocumentEvent::Modified(path) => self.schedule(path),
            DocumentEvent::Deleted(path) => {
                self.cancel(&path);
                self.indexer.remove_document(&path);
            }
            DocumentEvent::Renamed { from, to } => {
                self.cancel(&from);
                self.indexer.remove_document(&from);
                self.schedule(to);
            }
        }
    }

    /// Schedules a re-index of `path` after the debounce window, replacing any pending one.
    pub fn schedule(&self, path: String) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let indexer = self.indexer.clone();
        let pending = self.pending.clone();
        let delay = self.debounce;

        // The map lock is held until the new task is registered, so the task cannot observe the
        // map before its own entry exists.
        let mut map = self.pending.lock();
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = indexer.index_document(&task_path).await {
                tracing::warn!("[IndexWatcher] failed to re-index {}: {}", task_path, e);
            }
            let mut map = pending.lock();
            if map
                .get(&task_path)
                .is_some_and(|p| p.generation == generation)
            {
                map.remove(&task_path);
            }
        });
        if let Some(previous) = map.insert(path, PendingIndex { generation, handle }) {
            previous.handle.abort();
        }
    }

    fn cancel(&self, path: &str) {
        if let Some(previous) = self.pending.lock().remove(path) {
            previous.handle.abort();
        }
    }

    /// Number of documents with a re-index waiting for its debounce window.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Aborts the event loop and every pending re-index.
    pub fn teardown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        let pending: Vec<PendingIndex> = self.pending.lock().drain().map(|(_, p)| p).collect();
        tracing::debug!("[IndexWatcher] cancelling {} pending re-indexes", pending.len());
        for p in pending {
            p.handle.abort();
        }
    }
}
