//! Command-line front-end for a resift database.
//!
//! Usage:
//!     resift --db blog.sqlite index blog title 10 "Hello World"
//!     resift --db blog.sqlite query blog --term hello --field title
//!
//! Logging goes to stderr, filtered by `RUST_LOG` (default `warn`).

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use resift::{ContentFilter, Engine, EngineConfig, MatchMode, QueryCriteria};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "resift", version, about = "Relevance-ranked inverted index over SQLite")]
struct Cli {
    /// SQLite database file (created if missing)
    #[arg(long, env = "RESIFT_DB")]
    db: PathBuf,

    /// JSON engine configuration
    #[arg(long, env = "RESIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Index text for one document field
    Index {
        index: String,
        field: String,
        id: i64,
        /// Text to index; words are joined with spaces
        #[arg(required_unless_present = "file")]
        text: Vec<String>,
        /// Read the text from a file instead
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Flush the document's postings in the index first
        #[arg(long)]
        replace: bool,
    },
    /// Remove every posting of a document in an index
    Flush { index: String, id: i64 },
    /// Ranked documents matching the filters
    Query {
        index: String,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Page size (defaults to the configured limit)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Number of documents matching the filters
    Count {
        index: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Create a field with a weight (existing fields keep theirs)
    DefineField { index: String, field: String, weight: i64 },
    /// Flag a term as sensitive for the content filter
    MarkSensitive {
        term: String,
        /// Clear the flag instead
        #[arg(long)]
        clear: bool,
    },
    /// Catalog and posting counts for an index
    Stats { index: String },
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Restrict to a field (repeatable)
    #[arg(long = "field")]
    fields: Vec<String>,
    /// Restrict to a term (repeatable)
    #[arg(long = "term")]
    terms: Vec<String>,
    /// Restrict to a document id (repeatable)
    #[arg(long = "id")]
    ids: Vec<i64>,
    #[arg(long, value_enum)]
    field_mode: Option<MatchMode>,
    #[arg(long, value_enum)]
    term_mode: Option<MatchMode>,
    #[arg(long, value_enum)]
    content: Option<ContentFilter>,
}

impl FilterArgs {
    fn criteria(&self, engine: &Engine) -> QueryCriteria {
        let mut criteria = engine.criteria();
        for field in &self.fields {
            criteria = criteria.field(field);
        }
        for term in &self.terms {
            criteria = criteria.term(term);
        }
        for &id in &self.ids {
            criteria = criteria.document(id);
        }
        if let Some(mode) = self.field_mode {
            criteria = criteria.field_mode(mode);
        }
        if let Some(mode) = self.term_mode {
            criteria = criteria.term_mode(mode);
        }
        if let Some(filter) = self.content {
            criteria = criteria.content_filter(filter);
        }
        criteria
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let engine = Engine::open(&cli.db, config)
        .with_context(|| format!("opening {}", cli.db.display()))?;

    match cli.command {
        Commands::Index { index, field, id, text, file, replace } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => text.join(" "),
            };
            if replace {
                engine.flush(&index, id)?;
            }
            let mut buffer = engine.buffer();
            buffer.record(&index, &field, id, &text);
            let report = engine.save(&mut buffer);
            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!("{} postings written", report.postings_written);
            }
            if !report.is_complete() {
                anyhow::bail!("{} posting groups failed to save", report.failed_groups);
            }
        }
        Commands::Flush { index, id } => {
            let removed = engine.flush(&index, id)?;
            println!("{}", removed);
        }
        Commands::Query { index, filters, offset, limit } => {
            let criteria = filters.criteria(&engine);
            let limit = limit.unwrap_or(engine.config().default_limit);
            let hits = engine.query(&index, &criteria, offset, limit)?;
            if cli.json {
                println!("{}", serde_json::to_string(&hits)?);
            } else {
                for hit in hits {
                    println!("{}\t{}", hit.document_id, hit.relevance);
                }
            }
        }
        Commands::Count { index, filters } => {
            let count = engine.count(&index, &filters.criteria(&engine))?;
            println!("{}", count);
        }
        Commands::DefineField { index, field, weight } => {
            let entry = engine.define_field(&index, &field, weight)?;
            if cli.json {
                println!("{}", serde_json::to_string(&entry)?);
            } else {
                println!("{}\t{}\tweight={}", entry.id, entry.name, entry.weight);
            }
        }
        Commands::MarkSensitive { term, clear } => {
            engine.mark_sensitive(&term, !clear)?;
        }
        Commands::Stats { index } => {
            let Some(stats) = engine.stats(&index)? else {
                anyhow::bail!("unknown index: {}", index);
            };
            if cli.json {
                println!("{}", serde_json::to_string(&stats)?);
            } else {
                println!("fields:    {}", stats.fields);
                println!("terms:     {}", stats.terms);
                println!("documents: {}", stats.documents);
                println!("postings:  {}", stats.postings);
                println!("db size:   {:.1} KB", engine.database_size()? as f64 / 1024.0);
            }
        }
    }

    Ok(())
}
