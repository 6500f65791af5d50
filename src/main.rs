//! Omem CLI entry point.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use omem::{MemoryConfig, MemoryService, SearchOptions, Turn};
use std::io::Read as _;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omem")]
#[command(about = "Conversational memory engine: store conversations, search memories")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a conversation under a caller-assigned id
    Add {
        /// Conversation id, unique per store
        id: String,

        /// Path to a JSON array of {"role", "content"} turns (optional
        /// "name", "turn_id", "timestamp"), or "-" for stdin
        #[arg(long, default_value = "-")]
        turns: String,
    },
    /// Search stored memories with a natural-language query
    Search {
        query: String,

        /// Maximum facts returned
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum relevance score
        #[arg(long)]
        min_score: Option<f32>,

        /// Print raw scored facts instead of the prompt block
        #[arg(long)]
        raw: bool,
    },
    /// Rebuild the search index from a full store scan
    Rebuild,
    /// Print store counters
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = MemoryConfig::load().with_context(|| "failed to load configuration")?;
    tracing::debug!(data_dir = %config.data_dir.display(), "configuration loaded");

    let service = MemoryService::connect(config)
        .await
        .with_context(|| "failed to start memory service")?;

    match cli.command {
        Command::Add { id, turns } => {
            let raw = read_turns(&turns)?;
            let turns: Vec<Turn> =
                serde_json::from_str(&raw).with_context(|| "turns must be a JSON array of {role, content} objects")?;

            let outcome = service.add(&id, turns).await?;
            println!(
                "stored conversation {} ({} fact(s) extracted)",
                outcome.conversation_id, outcome.facts_extracted
            );
        }
        Command::Search {
            query,
            top_k,
            min_score,
            raw,
        } => {
            let result = service
                .search(&query, SearchOptions { top_k, min_score })
                .await?;

            if raw {
                for item in &result {
                    println!(
                        "[{:.2}] {} (from {})",
                        item.score, item.text, item.source_conversation_id
                    );
                }
            } else {
                println!("{}", result.to_prompt());
            }
        }
        Command::Rebuild => {
            let facts = service.rebuild_index().await?;
            println!("index rebuilt over {facts} fact(s)");
        }
        Command::Stats => {
            let stats = service.stats().await?;
            println!(
                "{} conversation(s), {} fact(s)",
                stats.conversations, stats.facts
            );
        }
    }

    Ok(())
}

/// Read the turns payload from a file path or stdin ("-").
fn read_turns(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .with_context(|| "failed to read turns from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("failed to read turns from {source}"))
    }
}
