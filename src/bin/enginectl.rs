//! `enginectl` — a thin CLI over [`graphrag_engine::Engine`].
//!
//! Generalized from a two-phase startup (bind a server, load the model in
//! the background) into a one-shot command runner: there is no long-lived
//! server here, so every subcommand loads its graph snapshot, does one
//! thing, and persists it back before exiting.
//!
//! ```text
//! enginectl ingest <path.pdf> [--category C] [--division D]
//! enginectl search "<query>" [--strategy keyword|vector|entity|hybrid|community]
//! enginectl schema
//! enginectl rebuild-communities
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use graphrag_engine::config::Config;
use graphrag_engine::engine::Engine;
use graphrag_engine::query::planner::{QueryOptions, Strategy};

const GRAPH_SNAPSHOT_PATH: &str = "data/graph_export.json";
const ERROR_LOG_PATH: &str = "data/errors.jsonl";

fn parse_strategy(s: &str) -> Result<Strategy> {
    Ok(match s {
        "keyword" => Strategy::Keyword,
        "vector" => Strategy::Vector,
        "entity" => Strategy::Entity,
        "hybrid" => Strategy::Hybrid,
        "community" => Strategy::Community,
        other => bail!("unknown strategy '{other}'; expected keyword|vector|entity|hybrid|community"),
    })
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("usage: enginectl <ingest|search|schema|rebuild-communities> [args...]");
    };

    let engine = Engine::new(Config::from_env(), ERROR_LOG_PATH);
    let snapshot = PathBuf::from(GRAPH_SNAPSHOT_PATH);
    if snapshot.exists() {
        engine.import_from(&snapshot).context("loading prior graph snapshot")?;
        tracing::info!(path = %snapshot.display(), "loaded graph snapshot");
    }

    match command.as_str() {
        "ingest" => {
            let Some(path) = args.get(1) else { bail!("usage: enginectl ingest <path.pdf> [--category C] [--division D]") };
            let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
            let filename = PathBuf::from(path).file_name().and_then(|s| s.to_str()).unwrap_or(path).to_string();
            let category = flag_value(&args, "--category");
            let division = flag_value(&args, "--division");

            let result = engine.ingest(bytes, filename, category, division).await;
            println!(
                "document_id={} status={:?} chunk_count={} entity_count={} errors={:?}",
                result.document_id, result.status, result.chunk_count, result.entity_count, result.errors
            );
        }
        "search" => {
            let Some(query) = args.get(1) else { bail!("usage: enginectl search \"<query>\" [--strategy S]") };
            let strategy = match flag_value(&args, "--strategy") {
                Some(s) => parse_strategy(&s)?,
                None => Strategy::Hybrid,
            };
            let result = engine.search(query, strategy, QueryOptions::default());
            println!(
                "strategy={} candidates={} elapsed_ms={}",
                result.strategy_actually_used, result.total_candidates_considered, result.elapsed_ms
            );
            for (rank, citation) in result.citations.iter().enumerate() {
                println!(
                    "  #{rank} [{score:.3}] {doc} p.{page} — {text}",
                    rank = rank + 1,
                    score = citation.final_score,
                    doc = citation.document_name,
                    page = citation.page_num,
                    text = citation.text.chars().take(120).collect::<String>(),
                );
            }
        }
        "schema" => {
            let summary = engine.schema();
            println!(
                "documents={} chunks={} entities={} relationships={:?}",
                summary.document_count, summary.chunk_count, summary.entity_count, summary.relationship_counts
            );
        }
        "rebuild-communities" => {
            engine.rebuild_communities_now()?;
            println!("community rebuild complete");
        }
        other => bail!("unknown command '{other}'"),
    }

    engine.export_to(&snapshot).context("saving graph snapshot")?;
    Ok(())
}
