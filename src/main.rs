// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Counsel entry point - CLI glue around the answering engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use counsel::chat::ChatOrchestrator;
use counsel::clients::ClientRegistry;
use counsel::config::AppConfig;
use counsel::ingest::DocumentIngestor;
use counsel::types::{ChatTurn, PageRecord, RequestOptions, RetrievalMode};

/// Counsel - grounded legal question answering.
#[derive(Parser)]
#[command(name = "counsel")]
#[command(author, version, about = "Grounded legal question answering", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "COUNSEL_CONFIG")]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question against the indexed corpus
    Ask {
        /// The question to answer
        question: String,

        /// Retrieval mode
        #[arg(short, long, value_enum, default_value = "hybrid")]
        mode: Mode,

        /// Number of passages to retrieve
        #[arg(short, long, default_value_t = 3)]
        top_k: usize,

        /// Exclude passages with this category
        #[arg(long)]
        exclude_category: Option<String>,

        /// Sampling temperature
        #[arg(short = 'T', long, default_value_t = 0.7)]
        temperature: f32,

        /// Suggest follow-up questions
        #[arg(short = 'F', long)]
        followups: bool,
    },

    /// Ingest pre-extracted corpus pages from a JSONL file
    Ingest {
        /// File with one JSON page record per line
        file: PathBuf,
    },

    /// Provision the collection without asking anything
    Provision,
}

/// Retrieval mode flag.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Text,
    Vector,
    Hybrid,
}

impl From<Mode> for RetrievalMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Text => RetrievalMode::Text,
            Mode::Vector => RetrievalMode::Vector,
            Mode::Hybrid => RetrievalMode::Hybrid,
        }
    }
}

#[tokio::main]
async fn main() -> counsel::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = AppConfig::load(cli.config.as_deref())?;
    let registry = Arc::new(ClientRegistry::new(config));

    match cli.command {
        Commands::Ask {
            question,
            mode,
            top_k,
            exclude_category,
            temperature,
            followups,
        } => {
            let orchestrator = ChatOrchestrator::from_registry(&registry).await?;
            let options = RequestOptions {
                top_k,
                retrieval_mode: mode.into(),
                exclude_category,
                temperature,
                suggest_followups: followups,
                ..Default::default()
            };

            let history = vec![ChatTurn::user(question)];
            let response = orchestrator.reply(&history, &options).await?;

            println!("{}\n", response.message.text);
            if !response.supporting_content.is_empty() {
                println!("Sources ({}):", response.citation_base_url);
                for record in &response.supporting_content {
                    println!("  [{}]", record.title);
                }
            }
            if !response.followup_questions.is_empty() {
                println!("Follow-ups:");
                for question in &response.followup_questions {
                    println!("  - {}", question);
                }
            }
        }

        Commands::Ingest { file } => {
            let pages = read_pages(&file)?;
            let ingestor = DocumentIngestor::from_registry(&registry).await?;
            let summary = ingestor.ingest(pages).await?;
            println!(
                "Indexed {} pages ({} skipped)",
                summary.indexed, summary.skipped
            );
        }

        Commands::Provision => {
            registry.store().await?;
            println!("Collection ready");
        }
    }

    Ok(())
}

/// One JSON `PageRecord` per line.
fn read_pages(path: &PathBuf) -> counsel::Result<Vec<PageRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading pages from {}", path.display()))?;

    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{} is not a valid page record", path.display(), number + 1))
        })
        .collect()
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if debug { "counsel=debug" } else { "counsel=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}
