//! blockprops CLI tool
//!
//! Command-line interface for indexing and querying inline block properties in a directory of
//! Markdown documents.
//!
//! ## Commands
//!
//! - `index`: Build the backlink index and print its statistics
//! - `search <key> [value]`: Blocks carrying a property
//! - `suggest <line>`: Completions for a partially typed property list
//! - `backlinks <path>`: Backlinks to a document and to each block it defines
//! - `graph`: The block reference graph as JSON
//! - `bulk-edit <key> --to <value>`: Preview (default) or `--apply` a bulk rewrite
//! - `watch`: Keep the index live and log updates (requires the `service` feature)
//!
//! Every command reads its settings from `--config` (default `<root>/blockprops.toml`); a missing
//! file means defaults.

use blockprops::{
    config::{ConfigProvider, EngineConfig, TomlConfigProvider},
    store::FsStore,
    suggest::CompletionContext,
    BlockPropsError, PropertyEngine,
};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(name = "blockprops")]
#[command(author, version, about = "Index, query and rewrite inline block properties", long_about = None)]
struct Cli {
    /// Root directory of the documents
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Engine configuration file (default: <root>/blockprops.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the backlink index and print statistics
    Index {
        /// Also print every indexed target with its backlink count
        #[arg(short, long)]
        verbose: bool,
    },

    /// Find blocks by property key and optional exact value
    Search {
        key: String,
        value: Option<String>,
    },

    /// Suggest completions for a partially typed line
    Suggest {
        line: String,

        /// Byte offset of the cursor (default: end of line)
        #[arg(long)]
        cursor: Option<usize>,
    },

    /// Show backlinks to a document and its blocks
    Backlinks {
        /// Document path relative to the root
        path: String,
    },

    /// Print the block reference graph as JSON
    Graph,

    /// Rewrite a property value across all documents
    BulkEdit {
        key: String,

        /// Only rewrite blocks whose current value equals this
        #[arg(long)]
        filter: Option<String>,

        /// Replacement value
        #[arg(long)]
        to: String,

        /// Write the changes (default: preview only)
        #[arg(long)]
        apply: bool,
    },

    /// Keep the index live and log every update
    Watch,
}

fn load_config(cli: &Cli) -> Result<EngineConfig, BlockPropsError> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join("blockprops.toml"));
    TomlConfigProvider::new(path).get_config()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = Arc::new(FsStore::with_extension(&cli.root, &config.default_extension)?);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli.command, store, config))?;
    Ok(())
}

async fn run(
    command: Commands,
    store: Arc<FsStore>,
    config: EngineConfig,
) -> Result<(), BlockPropsError> {
    match command {
        Commands::Index { verbose } => {
            let engine = PropertyEngine::new(store, config);
            if let Some(summary) = engine.build_index().await? {
                println!("Documents: {}", summary.documents);
                println!("Unreadable: {}", summary.failed);
                println!("Targets: {}", summary.stats.targets);
                println!("Backlinks: {}", summary.stats.total_backlinks);
            }
            if verbose {
                for (target, entries) in engine.indexer().snapshot().iter() {
                    println!("{target}\t{}", entries.len());
                }
            }
        }

        Commands::Search { key, value } => {
            let engine = PropertyEngine::new(store, config);
            for result in engine.search(&key, value.as_deref()).await? {
                println!(
                    "{}:{}\t^{}\t{}",
                    result.path,
                    result.line + 1,
                    result.block_id,
                    result.context
                );
            }
        }

        Commands::Suggest { line, cursor } => {
            let engine = PropertyEngine::new(store, config);
            let ctx = CompletionContext::new(&line, cursor.unwrap_or(line.len()));
            for suggestion in engine.get_suggestions(&ctx).await {
                match suggestion.path {
                    Some(path) => println!("{}\t{}\t{}", suggestion.kind, suggestion.text, path),
                    None => println!(
                        "{}\t{}\t{}",
                        suggestion.kind, suggestion.text, suggestion.count
                    ),
                }
            }
        }

        Commands::Backlinks { path } => {
            let engine = PropertyEngine::new(store, config);
            engine.build_index().await?;
            for (label, entries) in engine.backlinks_for_document(&path).await? {
                println!("{label}");
                for entry in entries {
                    println!(
                        "  {}:{}\t^{}\t{}",
                        entry.source_path,
                        entry.line + 1,
                        entry.source_block_id,
                        entry.key
                    );
                }
            }
        }

        Commands::Graph => {
            let engine = PropertyEngine::new(store, config);
            let graph = engine.build_graph().await?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }

        Commands::BulkEdit {
            key,
            filter,
            to,
            apply,
        } => {
            let engine = PropertyEngine::new(store, config);
            let preview = engine.preview_bulk_edit(&key, filter.as_deref()).await?;
            for result in &preview {
                println!(
                    "{}:{}\t^{}\t{}: {} -> {}",
                    result.path,
                    result.line + 1,
                    result.block_id,
                    key,
                    result.get(&key).unwrap_or_default(),
                    to
                );
            }
            if apply {
                let report = engine.apply_bulk_edit(&preview, &key, &to).await?;
                println!("{report}");
            } else {
                println!("{} blocks would change (pass --apply to write)", preview.len());
            }
        }

        Commands::Watch => {
            #[cfg(not(feature = "service"))]
            {
                eprintln!("Error: The 'watch' subcommand requires the 'service' feature.");
                eprintln!("Please rebuild with: cargo build --features \"bin service\"");
                std::process::exit(1);
            }

            #[cfg(feature = "service")]
            {
                let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
                let engine = PropertyEngine::with_events(store.clone(), config, tx);
                if let Some(summary) = engine.start().await? {
                    tracing::info!(
                        "Watching {:?}: {} documents, {} backlinks",
                        store.root(),
                        summary.documents,
                        summary.stats.total_backlinks
                    );
                }
                while let Some(event) = rx.recv().await {
                    let stats = engine.stats();
                    tracing::info!(
                        "[Event] {} ({} targets, {} backlinks)",
                        event,
                        stats.targets,
                        stats.total_backlinks
                    );
                }
                engine.teardown();
            }
        }
    }
    Ok(())
}
