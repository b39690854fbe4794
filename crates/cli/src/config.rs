use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use pagevec_core::{PageLayout, DEFAULT_CACHE_EXTENSION, DEFAULT_PAGE_PATTERN};
use pagevec_rag::{EmbeddingSettings, LlmProvider, PromptTemplate};

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub pattern: String,
    pub cache_extension: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PAGE_PATTERN.to_string(),
            cache_extension: DEFAULT_CACHE_EXTENSION.to_string(),
        }
    }
}

impl CorpusConfig {
    pub fn layout(&self) -> Result<PageLayout> {
        Ok(PageLayout::new(&self.pattern, &self.cache_extension)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerationConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl GenerationConfig {
    /// Command-line flags win over the environment, which wins over the file.
    pub fn resolve(
        &self,
        provider_flag: Option<String>,
        model_flag: Option<String>,
    ) -> Result<(LlmProvider, String)> {
        let provider_name = provider_flag
            .or_else(|| env::var("PAGEVEC_PROVIDER").ok())
            .or_else(|| self.provider.clone())
            .unwrap_or_else(|| "openai".to_string());
        let provider = LlmProvider::from_str(&provider_name)
            .ok_or_else(|| anyhow!("unknown provider {provider_name}"))?;
        let model = model_flag
            .or_else(|| env::var("PAGEVEC_MODEL").ok())
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| provider.default_model().to_string());
        Ok((provider, model))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptConfig {
    pub language: Option<String>,
    pub template_file: Option<PathBuf>,
}

impl PromptConfig {
    pub fn template(&self) -> Result<PromptTemplate> {
        if let Some(path) = &self.template_file {
            return PromptTemplate::load(path);
        }
        match &self.language {
            Some(language) => PromptTemplate::for_language(language)
                .ok_or_else(|| anyhow!("unsupported prompt language {language}")),
            None => Ok(PromptTemplate::default()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| anyhow!("invalid config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.search.top_k, DEFAULT_TOP_K);
        let layout = config.corpus.layout().unwrap();
        assert_eq!(layout.pattern(), "*_page_*.txt");
        assert_eq!(layout.cache_extension(), "vec");
    }

    #[test]
    fn sections_override_defaults() {
        let config = parse_config(
            r#"
            [embedding]
            provider = "hash"
            dimensions = 64

            [corpus]
            cache_extension = "emb"

            [search]
            top_k = 3

            [generation]
            provider = "local"

            [prompt]
            language = "zh-tw"
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.dimensions, 64);
        assert_eq!(config.embedding.seed, 1337);
        assert_eq!(config.corpus.pattern, DEFAULT_PAGE_PATTERN);
        assert_eq!(config.corpus.layout().unwrap().cache_extension(), "emb");
        assert_eq!(config.search.top_k, 3);
        let (provider, model) = config
            .generation
            .resolve(None, Some("tiny".to_string()))
            .unwrap();
        assert_eq!(provider, LlmProvider::Local);
        assert_eq!(model, "tiny");
        assert_eq!(
            config.prompt.template().unwrap(),
            PromptTemplate::traditional_chinese()
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse_config("[search]\ntop_k = \"many\"").is_err());
        let prompt = PromptConfig {
            language: Some("klingon".to_string()),
            template_file: None,
        };
        assert!(prompt.template().is_err());
    }
}
