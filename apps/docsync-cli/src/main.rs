//! `docsync`: manage a document store on a Couchbase cluster.
//!
//! Settings come from `config.toml`, `config.<RUST_ENV>.toml` and `APP_*`
//! environment variables (`APP_STORE__BUCKET=...`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::PathBuf;

use docsync_core::config::{expand_path, Config};
use docsync_core::data_processor::DataProcessor;
use docsync_core::types::{BatchReport, Filters};
use docsync_couchbase::RestConnector;
use docsync_embed::get_default_embedder;
use docsync_engine::DocumentStore;

#[derive(Parser)]
#[command(name = "docsync", version, about = "Keep documents and their search index in sync on a Couchbase cluster")]
struct Cli {
    /// Drop and recreate the collection and index on `create`.
    #[arg(long, global = true)]
    overwrite: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create scope, collection and search index.
    Create,
    /// Load `.txt` files from a directory and write them to the store.
    Ingest {
        /// Defaults to `data.raw_txt_dir`.
        dir: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        /// Overwrite records that already exist.
        #[arg(long)]
        upsert: bool,
        /// `key=value`, repeatable. Stored with every record.
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Vector search.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Number of documents the search index reports.
    Count,
    /// Whether the collection, a record id or a record name exists.
    Exists {
        #[arg(long, conflicts_with = "name")]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Drop the collection (and a collection-level index).
    Drop,
}

fn parse_filters(pairs: &[String]) -> anyhow::Result<Option<Filters>> {
    let mut filters = Filters::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("filter '{pair}' is not key=value");
        };
        filters.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
    }
    Ok((!filters.is_empty()).then_some(filters))
}

fn print_report(report: &BatchReport) {
    println!("📊 {} written, {} failed, {} skipped", report.stored.len(), report.failed.len(), report.skipped.len());
    for (id, reason) in &report.failed {
        println!("   ❌ {id}: {reason}");
    }
    for skipped in &report.skipped {
        println!("   ⚠️  {}: {}", skipped.name, skipped.reason);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let mut store_config = config.store()?;
    store_config.overwrite |= cli.overwrite;
    let embedder = get_default_embedder(&config.embedding())?;
    let mut store = DocumentStore::connect(&RestConnector::new(), store_config, embedder)?;

    match cli.command {
        Command::Create => {
            store.create()?;
            println!("✅ {} ready with index '{}'", store.handle(), store.search_index_name());
        }
        Command::Ingest { dir, limit, upsert, filters, batch_size } => {
            let filters = parse_filters(&filters)?;
            let dir = match dir {
                Some(dir) => dir,
                None => expand_path(config.get::<String>("data.raw_txt_dir").unwrap_or_else(|_| "./data/txt".to_string())),
            };
            let processor = DataProcessor::new();
            let documents = match limit {
                Some(limit) => processor.process_directory_limited(&dir, limit)?,
                None => processor.process_directory(&dir)?,
            };
            println!("Loaded {} documents from {}", documents.len(), dir.display());

            let progress = ProgressBar::new(documents.len() as u64);
            progress.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
            let mut total = BatchReport::default();
            for batch in documents.chunks(batch_size.max(1)) {
                let report = if upsert {
                    store.upsert(batch, filters.as_ref())
                } else {
                    store.insert(batch, filters.as_ref())
                };
                total.attempted += report.attempted;
                total.stored.extend(report.stored);
                total.failed.extend(report.failed);
                total.skipped.extend(report.skipped);
                progress.inc(batch.len() as u64);
            }
            progress.finish_with_message("done");
            print_report(&total);
        }
        Command::Search { query, limit, filters } => {
            let filters = parse_filters(&filters)?;
            let results = store.search(&query, limit, filters.as_ref())?;
            println!("🔍 {} results for \"{query}\"", results.len());
            for (i, doc) in results.iter().enumerate() {
                let preview: String = doc.content.chars().take(160).collect();
                println!("\n  {}. {}  id={}", i + 1, doc.name, doc.id.as_deref().unwrap_or("-"));
                println!("     {preview}");
            }
        }
        Command::Count => println!("{}", store.get_count()),
        Command::Exists { id, name } => {
            let exists = match (id, name) {
                (Some(id), _) => store.id_exists(&id),
                (None, Some(name)) => store.name_exists(&name),
                (None, None) => store.exists(),
            };
            println!("{exists}");
        }
        Command::Drop => {
            if store.delete()? {
                println!("🗑️  dropped {}", store.handle());
            } else {
                println!("nothing to drop");
            }
        }
    }
    Ok(())
}
