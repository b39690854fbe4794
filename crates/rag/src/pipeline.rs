use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::embedding::TextEncoder;
use crate::format::{join_blocks, render_blocks, PromptTemplate};
use crate::search::{ScoredResult, SearchEngine, SkippedEntry};
use crate::LlmClient;

pub struct RagQuery<'q> {
    pub question: &'q str,
    pub folder: &'q Path,
    pub top_k: usize,
}

pub struct RagAnswer {
    pub answer: String,
    pub model: String,
    pub prompt: String,
    pub results: Vec<ScoredResult>,
    pub skipped: Vec<SkippedEntry>,
}

/// Builds the retrieval prompt for `query` without calling a generator.
pub fn build_rag_prompt<E: TextEncoder + ?Sized>(
    engine: &SearchEngine<'_, E>,
    template: &PromptTemplate,
    query: &RagQuery<'_>,
) -> Result<(String, Vec<ScoredResult>, Vec<SkippedEntry>)> {
    let outcome = engine.search(query.question, query.folder, query.top_k)?;
    if outcome.results.is_empty() {
        warn!(
            folder = %query.folder.display(),
            "no cached pages matched; prompting without knowledge-base context"
        );
    }
    let context = join_blocks(&render_blocks(&outcome.results));
    let prompt = template.render(&context, query.question);
    Ok((prompt, outcome.results, outcome.skipped))
}

/// Retrieval followed by generation. Generator errors are returned unchanged.
pub fn execute_rag_query<E: TextEncoder + ?Sized>(
    engine: &SearchEngine<'_, E>,
    template: &PromptTemplate,
    client: &LlmClient,
    query: &RagQuery<'_>,
) -> Result<RagAnswer> {
    let (prompt, results, skipped) = build_rag_prompt(engine, template, query)?;
    info!(
        provider = client.provider().as_str(),
        model = client.model(),
        pages = results.len(),
        "sending prompt to generator"
    );
    let answer = client.generate(&prompt)?;
    Ok(RagAnswer {
        answer,
        model: client.model().to_string(),
        prompt,
        results,
        skipped,
    })
}
