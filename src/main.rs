//! # refcorpus CLI
//!
//! Every command prints exactly one JSON document on stdout. Logs go to
//! stderr (or to the configured log file).
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `refcorpus ingest <uploads>` | Parse new PDFs and persist their References |
//! | `refcorpus status <uploads>` | Per-upload ingestion status |
//! | `refcorpus references <uploads>` | The persisted reference list |
//! | `refcorpus update <uploads> <id> <patch>` | Patch one Reference |
//! | `refcorpus delete <uploads> [ids..] [--all]` | Delete References |
//! | `refcorpus retrieve <uploads> "<query>"` | BM25+ top chunks |
//!
//! `<uploads>` is a project's uploads directory; working directories
//! (`.staging`, `.grobid`, `.storage`) live next to it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use refcorpus::config::{self, Config, ProjectLayout};
use refcorpus::gateway::GrobidGateway;
use refcorpus::ingest;
use refcorpus::logging::init_logging;
use refcorpus::models::{DeleteRequest, MutationResponse};
use refcorpus::output::OutputChannel;
use refcorpus::service;
use refcorpus::store::ReferenceStore;

/// Local PDF reference corpus: ingestion and BM25 retrieval.
#[derive(Parser)]
#[command(name = "refcorpus", version)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every upload that has no Reference yet.
    Ingest {
        /// Project uploads directory.
        uploads: PathBuf,
    },

    /// Report ingestion status for every upload without ingesting.
    Status { uploads: PathBuf },

    /// Print the persisted reference list.
    References { uploads: PathBuf },

    /// Apply a JSON patch to one Reference.
    ///
    /// Unknown field names are rejected.
    Update {
        uploads: PathBuf,
        id: String,
        /// Patch document, e.g. '{"title": "New title"}'.
        patch: String,
    },

    /// Delete References by id, or all of them.
    Delete {
        uploads: PathBuf,
        ids: Vec<String>,
        #[arg(long)]
        all: bool,
    },

    /// Rank chunks against a query.
    Retrieve {
        uploads: PathBuf,
        query: String,
        /// Maximum chunks to return (defaults to retrieval.default_limit).
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    init_logging(&cfg.logging)?;

    let out = OutputChannel::stdout();

    match cli.command {
        Commands::Ingest { uploads } => {
            let gateway = GrobidGateway::new(&cfg.parser)?;
            let resp = ingest::run_ingest(&uploads, &cfg, &gateway, &out).await?;
            emit(&out, &resp)?;
        }
        Commands::Status { uploads } => {
            emit(&out, &ingest::get_statuses(&uploads))?;
        }
        Commands::References { uploads } => {
            emit(&out, &ingest::get_references(&uploads, &cfg)?)?;
        }
        Commands::Update { uploads, id, patch } => {
            let resp = match service::parse_patch(&patch) {
                Ok(patch) => match open_store(&uploads, &cfg) {
                    Ok(mut store) => service::update_reference(&mut store, &id, &patch),
                    Err(e) => MutationResponse::error(e.to_string()),
                },
                Err(e) => MutationResponse::error(e.to_string()),
            };
            emit(&out, &resp)?;
        }
        Commands::Delete { uploads, ids, all } => {
            let request = DeleteRequest {
                reference_ids: ids,
                all,
            };
            let resp = match open_store(&uploads, &cfg) {
                Ok(mut store) => service::delete_references(&mut store, &request),
                Err(e) => MutationResponse::error(e.to_string()),
            };
            emit(&out, &resp)?;
        }
        Commands::Retrieve {
            uploads,
            query,
            limit,
        } => {
            let store = open_store(&uploads, &cfg)?;
            let limit = limit.unwrap_or(cfg.retrieval.default_limit);
            emit(&out, &service::retrieve(&store, &query, limit))?;
        }
    }

    Ok(())
}

fn open_store(uploads: &Path, cfg: &Config) -> refcorpus::error::Result<ReferenceStore> {
    let layout = ProjectLayout::from_uploads_dir(uploads);
    ReferenceStore::open(layout.references_json_path(), cfg.chunking)
}

fn emit<T: Serialize>(out: &OutputChannel, value: &T) -> anyhow::Result<()> {
    out.write_json(value).context("failed to write response")
}
