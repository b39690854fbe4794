use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use pagevec_core::TEXT_EXTENSION;

use crate::search::ScoredResult;

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

const ENGLISH_TEMPLATE: &str = "### Knowledge base excerpts:
{context}
### When answering:
Cite the source file name and page range behind every statement (say upper or lower half when the file name distinguishes it).
### Question: {question}
";

const TRADITIONAL_CHINESE_TEMPLATE: &str = "### 知識庫內容:
{context}
### 回答時注意:
須附註顯示引用了哪些文件名稱的哪些頁數(可精確指出上半部或下半部)
### 使用者提問:{question}
";

pub fn render_block(rank: usize, result: &ScoredResult) -> String {
    format!(
        "Knowledgebase Top {rank} file: {}\nSimilarity score: {}\nContent: {}\n",
        result.path.with_extension(TEXT_EXTENSION).display(),
        result.score,
        result.content
    )
}

/// One block per result, ranks starting at 1.
pub fn render_blocks(results: &[ScoredResult]) -> Vec<String> {
    results
        .iter()
        .enumerate()
        .map(|(idx, result)| render_block(idx + 1, result))
        .collect()
}

pub fn join_blocks(blocks: &[String]) -> String {
    blocks.join("\n")
}

/// Prompt skeleton with `{context}` and `{question}` slots.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    body: String,
}

impl PromptTemplate {
    pub fn english() -> Self {
        Self {
            body: ENGLISH_TEMPLATE.to_string(),
        }
    }

    pub fn traditional_chinese() -> Self {
        Self {
            body: TRADITIONAL_CHINESE_TEMPLATE.to_string(),
        }
    }

    pub fn for_language(language: &str) -> Option<Self> {
        match language.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Self::english()),
            "zh-tw" | "zh_tw" | "zh-hant" => Some(Self::traditional_chinese()),
            _ => None,
        }
    }

    pub fn custom(body: impl Into<String>) -> Result<Self> {
        let body = body.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !body.contains(slot) {
                return Err(anyhow!("prompt template is missing the {slot} placeholder"));
            }
        }
        Ok(Self { body })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt template {}", path.display()))?;
        Self::custom(body).with_context(|| format!("invalid prompt template {}", path.display()))
    }

    /// Fills both slots in one pass, so placeholder-like text inside the
    /// context or question is left alone.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.body.len() + context.len() + question.len());
        let mut rest = self.body.as_str();
        loop {
            let next_context = rest.find(CONTEXT_SLOT);
            let next_question = rest.find(QUESTION_SLOT);
            let (idx, slot, value) = match (next_context, next_question) {
                (Some(c), Some(q)) if c < q => (c, CONTEXT_SLOT, context),
                (Some(c), None) => (c, CONTEXT_SLOT, context),
                (_, Some(q)) => (q, QUESTION_SLOT, question),
                (None, None) => break,
            };
            out.push_str(&rest[..idx]);
            out.push_str(value);
            rest = &rest[idx + slot.len()..];
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::english()
    }
}

/// Wraps an already rendered results block into the default template.
pub fn build_prompt(results_block: &str, question: &str) -> String {
    PromptTemplate::default().render(results_block, question)
}

pub fn format_results(results: &[ScoredResult], question: &str) -> String {
    build_prompt(&join_blocks(&render_blocks(results)), question)
}
