//! # Document stores
//!
//! The engine never owns documents. It talks to a [`DocumentStore`], which lists, reads, and
//! writes `/`-separated document paths relative to the store root and reports changes as
//! [`DocumentEvent`]s.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps documents in a map and reports its own mutations, which makes it the
//!   natural backend for tests and embedding hosts that push content in
//! - [`FsStore`] serves a directory of Markdown files; with the `service` feature its
//!   subscription is backed by a `notify` watcher

use parking_lot::{Mutex, RwLock};
use std::{
    collections::BTreeMap,
    future::Future,
    path::{Component, Path, PathBuf},
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use walkdir::WalkDir;

use crate::{error::BlockPropsError, event::DocumentEvent};

pub const DEFAULT_EXTENSION: &str = "md";

/// Storage and change notification for a corpus of text documents.
pub trait DocumentStore: Send + Sync + 'static {
    /// Every document path in the store, sorted.
    fn list_documents(
        &self,
    ) -> impl Future<Output = Result<Vec<String>, BlockPropsError>> + Send;

    /// Reads a document. Implementations may serve this from a cache.
    fn read(&self, path: &str) -> impl Future<Output = Result<String, BlockPropsError>> + Send;

    /// Reads a document bypassing any cache. Used right before a write.
    fn read_fresh(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<String, BlockPropsError>> + Send {
        self.read(path)
    }

    fn write(
        &self,
        path: &str,
        content: String,
    ) -> impl Future<Output = Result<(), BlockPropsError>> + Send;

    /// Extension appended to link paths that do not carry one.
    fn extension(&self) -> &str {
        DEFAULT_EXTENSION
    }

    /// Resolves the path part of a note link, as written inside `[[...]]`, to at most one
    /// document.
    ///
    /// Candidates are tried in order: relative to `source`'s directory, relative to the store
    /// root, then any document whose path ends with the link path (the shortest such path wins).
    /// A `#subpath` suffix is ignored and an empty link path refers to `source` itself.
    fn resolve_link_path(
        &self,
        link: &str,
        source: &str,
    ) -> impl Future<Output = Result<Option<String>, BlockPropsError>> + Send {
        async move {
            let documents = self.list_documents().await?;
            Ok(resolve_among(&documents, link, source, self.extension()))
        }
    }

    /// Starts delivering change events. Each call returns an independent receiver.
    fn subscribe(&self) -> Result<UnboundedReceiver<DocumentEvent>, BlockPropsError>;
}

/// Strips any `#subpath` and surrounding whitespace from a note link target.
pub fn link_path(link: &str) -> &str {
    link.split_once('#').map_or(link, |(path, _)| path).trim()
}

/// Appends `.{extension}` unless `path` already ends with it.
pub fn with_extension(path: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if path.ends_with(&suffix) {
        path.to_string()
    } else {
        format!("{path}{suffix}")
    }
}

/// File name of `path` without its extension: `notes/Plan.md` -> `Plan`.
pub fn basename(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Collapses `.` and `..` segments of a `/`-separated relative path. Returns `None` when the path
/// escapes the root.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

pub(crate) fn resolve_among(
    documents: &[String],
    link: &str,
    source: &str,
    extension: &str,
) -> Option<String> {
    let target = link_path(link);
    if target.is_empty() {
        return documents.iter().find(|doc| *doc == source).cloned();
    }
    let file = with_extension(target, extension);
    let known = |candidate: &str| documents.iter().any(|doc| doc == candidate);

    let source_dir = source.rsplit_once('/').map_or("", |(dir, _)| dir);
    if let Some(relative) = normalize_path(&format!("{source_dir}/{file}")) {
        if known(&relative) {
            return Some(relative);
        }
    }
    if let Some(rooted) = normalize_path(&file) {
        if known(&rooted) {
            return Some(rooted);
        }
        let suffix = format!("/{rooted}");
        return documents
            .iter()
            .filter(|doc| doc.ends_with(&suffix))
            .min_by_key(|doc| (doc.matches('/').count(), doc.as_str()))
            .cloned();
    }
    None
}

#[derive(Default)]
struct Subscribers(Mutex<Vec<UnboundedSender<DocumentEvent>>>);

impl Subscribers {
    fn add(&self) -> UnboundedReceiver<DocumentEvent> {
        let (tx, rx) = unbounded_channel();
        self.0.lock().push(tx);
        rx
    }

    fn broadcast(&self, event: DocumentEvent) {
        tracing::trace!("document event: {}", event);
        self.0.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// An in-process document store.
///
/// Every mutation (including [`DocumentStore::write`]) is reported to all subscribers.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, String>>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I, P, C>(documents: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let store = MemoryStore::new();
        {
            let mut docs = store.documents.write();
            for (path, content) in documents {
                docs.insert(path.into(), content.into());
            }
        }
        store
    }

    /// Creates or replaces a document and reports it as modified.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        self.documents.write().insert(path.clone(), content.into());
        self.subscribers.broadcast(DocumentEvent::Modified(path));
    }

    pub fn delete(&self, path: &str) -> Option<String> {
        let removed = self.documents.write().remove(path);
        if removed.is_some() {
            self.subscribers
                .broadcast(DocumentEvent::Deleted(path.to_string()));
        }
        removed
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<(), BlockPropsError> {
        {
            let mut docs = self.documents.write();
            let content = docs
                .remove(from)
                .ok_or_else(|| BlockPropsError::NotFound(format!("no document at {from}")))?;
            docs.insert(to.to_string(), content);
        }
        self.subscribers.broadcast(DocumentEvent::Renamed {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    /// Synchronous read, without going through the async trait.
    pub fn get(&self, path: &str) -> Option<String> {
        self.documents.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    async fn list_documents(&self) -> Result<Vec<String>, BlockPropsError> {
        Ok(self.documents.read().keys().cloned().collect())
    }

    async fn read(&self, path: &str) -> Result<String, BlockPropsError> {
        self.get(path)
            .ok_or_else(|| BlockPropsError::NotFound(format!("no document at {path}")))
    }

    async fn write(&self, path: &str, content: String) -> Result<(), BlockPropsError> {
        self.insert(path, content);
        Ok(())
    }

    fn subscribe(&self) -> Result<UnboundedReceiver<DocumentEvent>, BlockPropsError> {
        Ok(self.subscribers.add())
    }
}

/// A directory of Markdown documents on disk.
///
/// Hidden files and directories (names starting with `.`) are ignored.
pub struct FsStore {
    root: PathBuf,
    extension: String,
    #[cfg(feature = "service")]
    watchers: Mutex<Vec<notify::RecommendedWatcher>>,
}

impl FsStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, BlockPropsError> {
        Self::with_extension(root, DEFAULT_EXTENSION)
    }

    pub fn with_extension(
        root: impl AsRef<Path>,
        extension: &str,
    ) -> Result<Self, BlockPropsError> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(BlockPropsError::NotFound(format!(
                "document root {root:?} is not a directory"
            )));
        }
        Ok(FsStore {
            root,
            extension: extension.to_string(),
            #[cfg(feature = "service")]
            watchers: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a store path, refusing paths that leave the root.
    fn locate(&self, path: &str) -> Result<PathBuf, BlockPropsError> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(BlockPropsError::PermissionDenied);
        }
        Ok(self.root.join(relative))
    }

    /// Store path of an absolute filesystem path, if it names a visible document.
    fn store_path(root: &Path, extension: &str, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            let name = name.to_str()?;
            if name.starts_with('.') {
                return None;
            }
            parts.push(name);
        }
        let joined = parts.join("/");
        (path.extension().and_then(|e| e.to_str()) == Some(extension)).then_some(joined)
    }
}

impl DocumentStore for FsStore {
    async fn list_documents(&self) -> Result<Vec<String>, BlockPropsError> {
        let root = self.root.clone();
        let extension = self.extension.clone();
        tokio::task::spawn_blocking(move || {
            let mut documents = Vec::new();
            let walker = WalkDir::new(&root).into_iter().filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });
            for entry in walker {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(path) = FsStore::store_path(&root, &extension, entry.path()) {
                    documents.push(path);
                }
            }
            documents.sort();
            Ok::<_, BlockPropsError>(documents)
        })
        .await?
    }

    async fn read(&self, path: &str) -> Result<String, BlockPropsError> {
        let location = self.locate(path)?;
        Ok(tokio::fs::read_to_string(location).await?)
    }

    async fn write(&self, path: &str, content: String) -> Result<(), BlockPropsError> {
        let location = self.locate(path)?;
        tracing::debug!("Writing {:?}", location);
        Ok(tokio::fs::write(location, content).await?)
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    #[cfg(feature = "service")]
    fn subscribe(&self) -> Result<UnboundedReceiver<DocumentEvent>, BlockPropsError> {
        use notify::{
            event::{ModifyKind, RenameMode},
            EventKind, RecursiveMode, Watcher,
        };

        let (tx, rx) = unbounded_channel();
        let root = self.root.clone();
        let extension = self.extension.clone();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("[FsStore] watcher error: {}", e);
                        return;
                    }
                };
                let paths: Vec<Option<String>> = event
                    .paths
                    .iter()
                    .map(|p| FsStore::store_path(&root, &extension, p))
                    .collect();
                let events = match (event.kind, paths.as_slice()) {
                    (
                        EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                        [Some(from), Some(to)],
                    ) => vec![DocumentEvent::Renamed {
                        from: from.clone(),
                        to: to.clone(),
                    }],
                    (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), [from, to]) => from
                        .iter()
                        .map(|p| DocumentEvent::Deleted(p.clone()))
                        .chain(to.iter().map(|p| DocumentEvent::Modified(p.clone())))
                        .collect(),
                    (EventKind::Modify(ModifyKind::Name(RenameMode::From)), _)
                    | (EventKind::Remove(_), _) => paths
                        .iter()
                        .flatten()
                        .map(|p| DocumentEvent::Deleted(p.clone()))
                        .collect(),
                    (EventKind::Create(_), _) | (EventKind::Modify(_), _) => paths
                        .iter()
                        .flatten()
                        .map(|p| DocumentEvent::Modified(p.clone()))
                        .collect(),
                    _ => Vec::new(),
                };
                for event in events {
                    if tx.send(event).is_err() {
                        tracing::debug!("[FsStore] subscriber dropped");
                        return;
                    }
                }
            })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        self.watchers.lock().push(watcher);
        Ok(rx)
    }

    #[cfg(not(feature = "service"))]
    fn subscribe(&self) -> Result<UnboundedReceiver<DocumentEvent>, BlockPropsError> {
        Err(BlockPropsError::Service(
            "filesystem watching requires the `service` feature".to_string(),
        ))
    }
}
