//! # blockprops
//!
//! Inline block properties for plain-text documents: parsing, a corpus-wide backlink index,
//! property queries, autocomplete, bulk rewriting and a reference graph.
//!
//! ## Overview
//!
//! Any line of a document may carry one or more addressable blocks:
//!
//! ```text
//! Write the release notes ^rel-1 [status: todo, owner: [[Alice]], after: ^design]
//! ```
//!
//! `^rel-1` is the block id, the bracket holds `key: value` properties, and values may embed note
//! links (`[[Alice]]`, `[[notes/Plan|the plan]]`) and block references (`^design`).
//!
//! blockprops never owns documents. A host provides a [`DocumentStore`](store::DocumentStore)
//! (an in-process [`MemoryStore`](store::MemoryStore) and a directory-backed
//! [`FsStore`](store::FsStore) ship with the crate) and drives everything through a
//! [`PropertyEngine`].
//!
//! ## Architecture
//!
//! - **[`codec`]**: the only place that knows the text syntax; parses lines into typed blocks
//! - **[`properties`]**: `Block`, `Property`, `ParsedValue`, `Link` and property templates
//! - **[`index`]**: the backlink index (target to referencing properties)
//! - **[`watch`]**: per-document debounced index maintenance from [`event::DocumentEvent`]s
//! - **[`query`]**: `key` / `key = value` searches over raw property text
//! - **[`suggest`]**: frequency-ranked completion of keys, values, note links and block ids
//! - **[`resolve`]**: note link and block reference resolution
//! - **[`edit`]**: single-line property edits and the multi-document bulk rewrite
//! - **[`graph`]**: the deduplicated block reference graph
//! - **[`config`]**: `EngineConfig` and its TOML provider
//!
//! ## Quick Start
//!
//! ```rust
//! use blockprops::{config::EngineConfig, store::MemoryStore, PropertyEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), blockprops::BlockPropsError> {
//! let store = Arc::new(MemoryStore::with_documents([
//!     ("plan.md", "Design ^design [status: done]\nBuild ^build [status: todo, after: ^design]"),
//! ]));
//! let engine = PropertyEngine::new(store, EngineConfig::default());
//! engine.build_index().await?;
//!
//! assert_eq!(engine.backlinks_for_block("design")[0].source_block_id, "build");
//! assert_eq!(engine.search("status", Some("todo")).await?.len(), 1);
//!
//! let preview = engine.preview_bulk_edit("status", Some("todo")).await?;
//! let report = engine.apply_bulk_edit(&preview, "status", "done").await?;
//! assert_eq!(report.success, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `service`: filesystem watching for [`FsStore`](store::FsStore) via `notify`
//! - `bin`: the `blockprops` command line tool

pub mod codec;
pub mod config;
pub mod edit;
pub mod engine;
pub mod error;
pub mod event;
pub mod graph;
pub mod index;
pub mod properties;
pub mod query;
pub mod resolve;
pub mod store;
pub mod suggest;
#[cfg(test)]
mod tests;
pub mod watch;

pub use engine::PropertyEngine;
pub use error::*;
