pub mod builder;
pub mod embedding;
pub mod format;
pub mod pipeline;
pub mod search;

pub use builder::{BuildFailure, BuildReport, CacheBuilder, StaleEntry, Staleness};
pub use embedding::{EmbeddingClient, EmbeddingSettings, TextEncoder};
pub use format::{build_prompt, format_results, render_block, render_blocks, PromptTemplate};
pub use pipeline::{build_rag_prompt, execute_rag_query, RagAnswer, RagQuery};
pub use search::{ScoredResult, SearchEngine, SearchOutcome, SkippedEntry};
pub use pagevec_llm::{LlmClient, LlmProvider, LlmRequest, LlmResponse};
