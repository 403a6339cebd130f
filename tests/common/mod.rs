//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Documents of the test vault, relative to its root.
#[allow(dead_code)]
pub const VAULT: &[(&str, &str)] = &[
    (
        "tasks/sprint.md",
        "# Sprint\n\
         Fix login ^login [status: todo, priority: high, owner: [[Alice]]]\n\
         Write docs ^docs [status: todo, after: ^login]\n",
    ),
    (
        "tasks/backlog.md",
        "Dark mode ^dark [status: todo, priority: low]\nIdeas ^ideas [status: done]\n",
    ),
    ("people/Alice.md", "# Alice\nMaintainer ^alice [role: lead]\n"),
];

/// Writes [`VAULT`] into `<temp_dir>/vault` and returns that directory.
///
/// A hidden directory and a non-Markdown file are added alongside; stores must ignore both.
#[allow(dead_code)]
pub fn create_test_vault(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("vault");
    for (path, content) in VAULT {
        let file = root.join(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }
    std::fs::create_dir_all(root.join(".trash")).unwrap();
    std::fs::write(root.join(".trash/old.md"), "^old [status: todo]").unwrap();
    std::fs::write(root.join("notes.txt"), "^txt [status: todo]").unwrap();
    root
}
