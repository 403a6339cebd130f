//! Shared test utilities for engine-level tests

use crate::{config::EngineConfig, store::MemoryStore, PropertyEngine};
use std::sync::Arc;

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A small project corpus: two task lists cross-referencing each other, a people note, and a
/// document without blocks.
pub fn project_corpus() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "projects/launch.md",
            "# Launch\n\
             Design the page ^design [status: done, owner: [[Alice]]]\n\
             Build it ^build [status: todo, priority: high, after: ^design]\n\
             \n\
             Ship ^ship [status: todo, priority: low, after: ^build, needs: ^legal]",
        ),
        (
            "projects/ops.md",
            "Alerts ^alerts [status: in-progress, owner: [[people/Alice|Al]], price: 20]",
        ),
        ("people/Alice.md", "Alice owns design and alerting ^alice"),
        ("README.md", "Nothing to see"),
    ]
}

pub fn create_test_engine(
    documents: Vec<(&'static str, &'static str)>,
) -> (Arc<MemoryStore>, PropertyEngine<MemoryStore>) {
    init_logging();
    let store = Arc::new(MemoryStore::with_documents(documents));
    let engine = PropertyEngine::new(store.clone(), EngineConfig::default());
    (store, engine)
}
