//! Turning parsed links into concrete document locations.
//!
//! Block references resolve local-first: the current document is searched before the rest of the
//! corpus, so same-document references never trigger a corpus scan.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{
    codec,
    error::BlockPropsError,
    properties::{Link, LinkKind},
    store::DocumentStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLink {
    pub path: String,
    pub block_id: Option<String>,
    /// Zero-based line of the block, when the link points at one.
    pub line: Option<usize>,
}

impl ResolvedLink {
    fn document(path: String) -> Self {
        ResolvedLink {
            path,
            block_id: None,
            line: None,
        }
    }
}

/// Resolves a note link target (`Plan`, `notes/Plan#Goals`, `Plan#^step-2`) seen in `source`.
///
/// A `#^id` subpath additionally locates that block inside the resolved document.
pub async fn resolve_note_link<S: DocumentStore>(
    store: &S,
    target: &str,
    source: &str,
) -> Result<Option<ResolvedLink>, BlockPropsError> {
    let Some(path) = store.resolve_link_path(target, source).await? else {
        tracing::debug!("Note link {:?} from {} did not resolve", target, source);
        return Ok(None);
    };
    let anchor = target
        .split_once("#^")
        .map(|(_, id)| id.trim())
        .filter(|id| !id.is_empty());
    let Some(anchor) = anchor else {
        return Ok(Some(ResolvedLink::document(path)));
    };
    let line = match store.read(&path).await {
        Ok(content) => codec::find_block_line(&content, anchor),
        Err(e) => {
            tracing::warn!("Cannot read {} to locate ^{}: {}", path, anchor, e);
            None
        }
    };
    Ok(Some(ResolvedLink {
        path,
        block_id: Some(anchor.to_string()),
        line,
    }))
}

/// Locates the block `block_id`: in `current` first, then (when `search_corpus` is set) in every
/// other document in listing order.
pub async fn resolve_block_ref<S: DocumentStore>(
    store: &S,
    block_id: &str,
    current: Option<&str>,
    search_corpus: bool,
) -> Result<Option<ResolvedLink>, BlockPropsError> {
    let block_id = block_id.trim_start_matches('^');
    let found = |path: &str, line: usize| ResolvedLink {
        path: path.to_string(),
        block_id: Some(block_id.to_string()),
        line: Some(line),
    };

    if let Some(current) = current {
        match store.read(current).await {
            Ok(content) => {
                if let Some(line) = codec::find_block_line(&content, block_id) {
                    return Ok(Some(found(current, line)));
                }
            }
            Err(e) => tracing::warn!("Cannot read current document {}: {}", current, e),
        }
    }

    if !search_corpus {
        return Ok(None);
    }
    for path in store.list_documents().await? {
        if Some(path.as_str()) == current {
            continue;
        }
        match store.read(&path).await {
            Ok(content) => {
                if let Some(line) = codec::find_block_line(&content, block_id) {
                    return Ok(Some(found(&path, line)));
                }
            }
            Err(e) => tracing::debug!("Skipping {} while resolving ^{}: {}", path, block_id, e),
        }
    }
    Ok(None)
}

/// Resolves `link`, found in `source`, to the location a caller should open.
pub async fn navigate<S: DocumentStore>(
    store: &S,
    link: &Link,
    source: &str,
    current: Option<&str>,
    search_corpus: bool,
) -> Result<Option<ResolvedLink>, BlockPropsError> {
    match link.kind {
        LinkKind::Note => resolve_note_link(store, &link.target, source).await,
        LinkKind::Block => resolve_block_ref(store, &link.target, current, search_corpus).await,
    }
}

/// Every block id defined in the document at `path`.
pub async fn block_ids<S: DocumentStore>(
    store: &S,
    path: &str,
) -> Result<Vec<String>, BlockPropsError> {
    Ok(codec::block_ids(&store.read(path).await?))
}

/// Block id to the first document (in listing order) that defines it.
#[tracing::instrument(skip_all)]
pub async fn all_block_ids<S: DocumentStore>(
    store: &S,
) -> Result<BTreeMap<String, String>, BlockPropsError> {
    let mut ids = BTreeMap::new();
    for path in store.list_documents().await? {
        match store.read(&path).await {
            Ok(content) => {
                for id in codec::block_ids(&content) {
                    ids.entry(id).or_insert_with(|| path.clone());
                }
            }
            Err(e) => tracing::debug!("Skipping {} while listing block ids: {}", path, e),
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::parse_value, store::MemoryStore};
    use test_log::test;

    fn store() -> MemoryStore {
        MemoryStore::with_documents([
            ("a.md", "intro\n^shared [owner: a]\n^only-a"),
            ("b.md", "^shared [owner: b]\n\n^step-2 [k: v]"),
            ("notes/Plan.md", "# Plan\n^goal [k: v]"),
        ])
    }

    #[test(tokio::test)]
    async fn test_block_ref_prefers_current_document() {
        let store = store();
        let local = resolve_block_ref(&store, "shared", Some("b.md"), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((local.path.as_str(), local.line), ("b.md", Some(0)));

        let global = resolve_block_ref(&store, "^shared", None, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((global.path.as_str(), global.line), ("a.md", Some(1)));

        let fallback = resolve_block_ref(&store, "step-2", Some("a.md"), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((fallback.path.as_str(), fallback.line), ("b.md", Some(2)));
    }

    #[test(tokio::test)]
    async fn test_block_ref_without_corpus_search() {
        let store = store();
        assert_eq!(
            resolve_block_ref(&store, "step-2", Some("a.md"), false)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            resolve_block_ref(&store, "missing", None, true).await.unwrap(),
            None
        );
    }

    #[test(tokio::test)]
    async fn test_note_links_and_anchors() {
        let store = store();
        let plan = resolve_note_link(&store, "Plan", "a.md").await.unwrap().unwrap();
        assert_eq!(plan, ResolvedLink::document("notes/Plan.md".to_string()));

        let anchored = resolve_note_link(&store, "notes/Plan#^goal", "a.md")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anchored.block_id.as_deref(), Some("goal"));
        assert_eq!(anchored.line, Some(1));

        assert_eq!(resolve_note_link(&store, "Nope", "a.md").await.unwrap(), None);
    }

    #[test(tokio::test)]
    async fn test_navigate_by_kind() {
        let store = store();
        let parsed = parse_value("[[Plan]] ^step-2");
        let note = navigate(&store, &parsed.links[0], "a.md", Some("a.md"), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(note.path, "notes/Plan.md");
        let block = navigate(&store, &parsed.links[1], "a.md", Some("a.md"), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((block.path.as_str(), block.line), ("b.md", Some(2)));
    }

    #[test(tokio::test)]
    async fn test_block_id_listing() {
        let store = store();
        assert_eq!(
            block_ids(&store, "a.md").await.unwrap(),
            vec!["shared", "only-a"]
        );
        let all = all_block_ids(&store).await.unwrap();
        assert_eq!(all["shared"], "a.md");
        assert_eq!(all["step-2"], "b.md");
        assert_eq!(all["goal"], "notes/Plan.md");
        assert_eq!(all.len(), 4);
    }
}
