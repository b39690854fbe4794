mod config;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use pagevec_core::PageLayout;
use pagevec_rag::{
    build_rag_prompt, execute_rag_query, render_blocks, BuildReport, CacheBuilder,
    EmbeddingClient, LlmClient, RagQuery, SearchEngine, SearchOutcome, StaleEntry, TextEncoder,
};

use crate::config::{load_config, AppConfig};

const DEFAULT_CONFIG: &str = "pagevec.toml";

#[derive(Parser, Debug)]
#[command(
    name = "pagevec",
    version,
    about = "Page-level embedding cache and retrieval for paginated text extracts"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed every page file under ROOT that has no cache entry yet.
    Index { root: PathBuf },
    /// Rank cached pages under FOLDER against QUERY.
    Search {
        folder: PathBuf,
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Print the generation prompt without calling a model.
    Prompt {
        folder: PathBuf,
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Retrieve, build the prompt and ask the configured model.
    Ask {
        folder: PathBuf,
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Report cache entries whose page changed, vanished or used another model.
    Audit {
        root: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = load_config(&config_path)?;
    config.embedding = config.embedding.clone().with_env_overrides();
    let layout = config.corpus.layout()?;
    let encoder = EmbeddingClient::from_settings(&config.embedding)
        .context("failed to initialise the embedding backend")?;
    tracing::debug!(model = encoder.model_id(), "embedding backend ready");

    match cli.command {
        Commands::Index { root } => {
            let report = CacheBuilder::new(&encoder)
                .with_layout(layout)
                .build(&root)?;
            print_build_report(&report);
            if !report.is_clean() {
                return Err(anyhow!(
                    "{} of {} pages could not be indexed",
                    report.failures.len(),
                    report.discovered
                ));
            }
        }
        Commands::Search {
            folder,
            query,
            top_k,
            json,
        } => {
            let k = top_k.unwrap_or(config.search.top_k);
            let engine = SearchEngine::new(&encoder).with_layout(layout);
            let outcome = engine.search(&query, &folder, k)?;
            if json {
                print_search_json(&outcome)?;
            } else {
                let blocks = render_blocks(&outcome.results);
                println!("{}", blocks.join("\n"));
            }
        }
        Commands::Prompt {
            folder,
            question,
            top_k,
        } => {
            let template = config.prompt.template()?;
            let engine = SearchEngine::new(&encoder).with_layout(layout);
            let query = rag_query(&config, &question, &folder, top_k);
            let (prompt, _, _) = build_rag_prompt(&engine, &template, &query)?;
            println!("{prompt}");
        }
        Commands::Ask {
            folder,
            question,
            top_k,
            provider,
            model,
        } => {
            let template = config.prompt.template()?;
            let (provider, model) = config.generation.resolve(provider, model)?;
            let client = LlmClient::new(provider, model)?;
            let engine = SearchEngine::new(&encoder).with_layout(layout);
            let query = rag_query(&config, &question, &folder, top_k);
            let answer = execute_rag_query(&engine, &template, &client, &query)?;
            println!("{}", answer.answer.trim());
            eprintln!(
                "[pagevec] model {} answered from {} page(s)",
                answer.model,
                answer.results.len()
            );
        }
        Commands::Audit { root, json } => {
            let stale = audit(&encoder, layout, &root)?;
            if json {
                print_audit_json(&stale)?;
            } else if stale.is_empty() {
                println!("all cache entries match their pages");
            } else {
                for entry in &stale {
                    println!("{}\t{}", entry.reason.label(), entry.cache_path.display());
                }
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn rag_query<'q>(
    config: &AppConfig,
    question: &'q str,
    folder: &'q Path,
    top_k: Option<usize>,
) -> RagQuery<'q> {
    RagQuery {
        question,
        folder,
        top_k: top_k.unwrap_or(config.search.top_k),
    }
}

fn audit(encoder: &EmbeddingClient, layout: PageLayout, root: &Path) -> Result<Vec<StaleEntry>> {
    Ok(CacheBuilder::new(encoder).with_layout(layout).audit(root)?)
}

fn print_build_report(report: &BuildReport) {
    println!(
        "pages: {}  written: {}  already cached: {}  failed: {}",
        report.discovered,
        report.written.len(),
        report.already_cached,
        report.failures.len()
    );
    for failure in &report.failures {
        eprintln!("failed: {}: {}", failure.path.display(), failure.error);
    }
}

fn print_search_json(outcome: &SearchOutcome) -> Result<()> {
    let skipped: Vec<_> = outcome
        .skipped
        .iter()
        .map(|entry| {
            json!({
                "path": entry.path.display().to_string(),
                "error": entry.error.to_string(),
            })
        })
        .collect();
    let value = json!({
        "scanned": outcome.scanned,
        "results": outcome.results,
        "skipped": skipped,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_audit_json(stale: &[StaleEntry]) -> Result<()> {
    let entries: Vec<_> = stale
        .iter()
        .map(|entry| {
            json!({
                "cache_path": entry.cache_path.display().to_string(),
                "text_path": entry.text_path.display().to_string(),
                "reason": entry.reason.label(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
