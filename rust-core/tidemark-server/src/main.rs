// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//! Tidemark node binary.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tidemark_core::{IndexError, IndexSettings, LogFormat, TidemarkConfig, TidemarkNode};
use tidemark_document::{merge_hits, TantivyWriterFactory};
use tidemark_mapping::Mappings;
use tidemark_storage::{RedbBackend, StorageBackend};
use tracing::info;

/// Documents handed to one `ingest` call.
const INGEST_CHUNK: usize = 1000;

#[derive(Parser, Debug)]
#[command(
    name = "tidemark",
    version,
    about = "Time-aware document store with a write-ahead ingestion path",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, short, global = true, value_name = "FILE", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the WAL consumer until interrupted.
    Serve,
    /// Append NDJSON documents to an index and replay them into segments.
    Ingest(IngestCmd),
    /// Query the segments of an index.
    Search(SearchCmd),
    /// List indexes with their shard statistics.
    Indexes,
}

#[derive(Args, Debug)]
struct IngestCmd {
    #[arg(long, help = "Target index, created when missing")]
    index: String,

    #[arg(long, help = "Shard count for a newly created index")]
    shards: Option<u32>,

    #[arg(long, value_name = "FILE", help = "JSON mappings for a newly created index")]
    mappings: Option<PathBuf>,

    #[arg(value_name = "FILE", help = "Newline-delimited JSON documents")]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct SearchCmd {
    #[arg(long)]
    index: String,

    #[arg(long, help = "Lower time bound, epoch milliseconds")]
    from: Option<i64>,

    #[arg(long, help = "Upper time bound, epoch milliseconds")]
    to: Option<i64>,

    #[arg(long, default_value_t = 10)]
    limit: usize,

    #[arg(value_name = "QUERY")]
    query: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = TidemarkConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(config.log_format);

    let writers = Arc::new(TantivyWriterFactory::new(config.segments_dir()));
    let node = open_node(&config, Arc::clone(&writers)).await?;

    match cli.command {
        Command::Serve => serve(node).await,
        Command::Ingest(cmd) => ingest(node, cmd).await,
        Command::Search(cmd) => search(node, &writers, cmd),
        Command::Indexes => list_indexes(node),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn open_node(
    config: &TidemarkConfig,
    writers: Arc<TantivyWriterFactory>,
) -> anyhow::Result<TidemarkNode> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let store: Arc<dyn StorageBackend> = Arc::new(
        RedbBackend::open(config.metadata_path()).context("opening metadata store")?,
    );
    let node = TidemarkNode::open(config.clone(), store, writers)
        .await
        .context("opening node")?;
    Ok(node)
}

async fn serve(node: TidemarkNode) -> anyhow::Result<()> {
    let (stop, consumer) = node.spawn_consumer();
    shutdown_signal().await?;

    // The loop may already have exited; the send result does not matter.
    let _ = stop.send(true);
    consumer.await.context("consumer task")?;
    node.shutdown().await?;
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on unix, SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl-C")?;
                info!("received SIGINT, starting graceful shutdown");
            }
            _ = terminate.recv() => info!("received SIGTERM, starting graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
        info!("received SIGINT, starting graceful shutdown");
    }
    Ok(())
}

async fn ingest(node: TidemarkNode, cmd: IngestCmd) -> anyhow::Result<()> {
    match node.catalog().get_index(&cmd.index) {
        Ok(_) => {}
        Err(IndexError::IndexNotFound(_)) => {
            let defaults = &node.config().index;
            let settings = IndexSettings::new(
                cmd.shards.unwrap_or(defaults.default_shards),
                defaults.default_replicas,
            );
            let mappings = match &cmd.mappings {
                Some(path) => read_mappings(path)?,
                None => Mappings::default(),
            };
            node.catalog()
                .create_index(&cmd.index, settings, mappings)
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    let docs = read_ndjson(&cmd.input)?;
    let mut accepted = 0;
    for chunk in docs.chunks(INGEST_CHUNK) {
        let report = node.ingestor().ingest(&cmd.index, chunk.to_vec()).await?;
        accepted += report.ids.len();
    }
    println!("accepted {accepted} documents into '{}'", cmd.index);

    node.drain().await;
    let failing: Vec<String> = node
        .consumer()
        .health()
        .into_iter()
        .filter(|(_, h)| h.consecutive_failures > 0)
        .map(|(name, _)| name)
        .collect();
    node.shutdown().await?;
    if !failing.is_empty() {
        bail!("replay failed for shards {failing:?}; entries stay in the WAL");
    }
    Ok(())
}

fn search(
    node: TidemarkNode,
    writers: &TantivyWriterFactory,
    cmd: SearchCmd,
) -> anyhow::Result<()> {
    let index = node.catalog().get_index(&cmd.index)?;
    let (start, end) = (cmd.from.unwrap_or(0), cmd.to.unwrap_or(i64::MAX));

    let mut hits = Vec::new();
    for segment in index.segments_by_time(start, end) {
        let Some(searcher) = writers.searcher(segment.key())? else {
            continue;
        };
        let found = if cmd.from.is_some() || cmd.to.is_some() {
            searcher.search_range(&cmd.query, start, end, cmd.limit)?
        } else {
            searcher.search(&cmd.query, cmd.limit)?
        };
        hits.extend(found);
    }

    for hit in merge_hits(hits, cmd.limit) {
        println!("{}", serde_json::to_string(&hit)?);
    }
    node.catalog().registry().close_all()?;
    Ok(())
}

fn list_indexes(node: TidemarkNode) -> anyhow::Result<()> {
    for index in node.catalog().list_indexes() {
        let shards: Vec<Value> = index
            .shards()
            .iter()
            .map(|shard| {
                let stat = shard.stat();
                json!({
                    "shard": shard.id(),
                    "docs": stat.doc_num,
                    "segments": shard.segments().len(),
                    "wal_index": stat.wal_index,
                    "min_time": stat.min_time,
                    "max_time": stat.max_time,
                })
            })
            .collect();
        let line = json!({
            "index": index.name(),
            "settings": index.settings(),
            "shards": shards,
        });
        println!("{line}");
    }
    node.catalog().registry().close_all()?;
    Ok(())
}

fn read_mappings(path: &Path) -> anyhow::Result<Mappings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading mappings {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing mappings {}", path.display()))?;
    Ok(Mappings::from_json(value)?)
}

fn read_ndjson(path: &Path) -> anyhow::Result<Vec<Value>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut docs = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid JSON", path.display(), number + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}
