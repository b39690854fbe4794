use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::env;

use pagevec_core::{HashEmbedder, HashEmbedderConfig, RetrievalError};

/// Text to vector. Implementations must be deterministic for a fixed
/// configuration; `model_id` names that configuration and is recorded in
/// every cache entry.
pub trait TextEncoder {
    fn model_id(&self) -> &str;
    fn encode(&self, text: &str) -> pagevec_core::Result<Vec<f32>>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub model: Option<String>,
    pub dimensions: usize,
    pub seed: u64,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        let hash = HashEmbedderConfig::default();
        Self {
            provider: "hash".to_string(),
            model: None,
            dimensions: hash.dimensions,
            seed: hash.seed,
            base_url: None,
        }
    }
}

impl EmbeddingSettings {
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(provider) = env::var("EMBEDDING_PROVIDER") {
            self.provider = provider;
        }
        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            self.model = Some(model);
        }
        if let Some(dims) = env::var("HASH_EMBED_DIMENSIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.dimensions = dims;
        }
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            self.base_url = Some(base_url);
        }
        self
    }
}

#[derive(Clone)]
enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
}

/// The process-wide encoder. Build it once and hand references to the cache
/// builder and the search engine.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
    model_id: String,
}

impl EmbeddingClient {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        match settings.provider.trim().to_lowercase().as_str() {
            "openai" => {
                let model = settings
                    .model
                    .clone()
                    .unwrap_or_else(|| "text-embedding-3-small".to_string());
                let base_url = settings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
                let client = OpenAiEmbeddingClient::new(&model, &base_url)?;
                Ok(Self {
                    model_id: format!("openai:{model}"),
                    backend: EmbeddingBackend::OpenAi(client),
                })
            }
            "hash" => {
                if settings.dimensions == 0 {
                    return Err(anyhow!("hash embedder needs at least one dimension"));
                }
                Ok(Self::hash_with(HashEmbedderConfig {
                    dimensions: settings.dimensions,
                    seed: settings.seed,
                }))
            }
            other => Err(anyhow!("unknown embedding provider {other:?}")),
        }
    }

    pub fn hash() -> Self {
        Self::hash_with(HashEmbedderConfig::default())
    }

    pub fn hash_with(config: HashEmbedderConfig) -> Self {
        let embedder = HashEmbedder::new(config);
        Self {
            model_id: embedder.model_id(),
            backend: EmbeddingBackend::Hash(embedder),
        }
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(idx) = inputs.iter().position(|text| text.trim().is_empty()) {
            return Err(anyhow!("input {idx} is empty"));
        }
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => inputs
                .iter()
                .map(|text| embedder.embed_text(text).map_err(anyhow::Error::from))
                .collect(),
            EmbeddingBackend::OpenAi(client) => client.embed_batch(inputs),
        }
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = vec![text.to_string()];
        let mut output = self.embed_batch(&inputs)?;
        output
            .pop()
            .ok_or_else(|| anyhow!("embedding backend returned no vector"))
    }
}

impl TextEncoder for EmbeddingClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn encode(&self, text: &str) -> pagevec_core::Result<Vec<f32>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => embedder.embed_text(text),
            EmbeddingBackend::OpenAi(_) => self
                .embed(text)
                .map_err(|err| RetrievalError::Encode(format!("{err:#}"))),
        }
    }
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(model: &str, base_url: &str) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY is required for openai embeddings"))?;
        Ok(Self {
            http: Client::new(),
            model: model.to_string(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .context("openai embeddings request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "openai embeddings request failed: {}",
                response.status()
            ));
        }
        let mut parsed: OpenAiEmbeddingResponse = response.json()?;
        if parsed.data.len() != inputs.len() {
            return Err(anyhow!(
                "openai returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            ));
        }
        parsed.data.sort_by_key(|data| data.index);
        Ok(parsed.data.into_iter().map(|data| data.embedding).collect())
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_client_is_deterministic() {
        let client = EmbeddingClient::hash();
        let a = client.encode("alpha protocol").unwrap();
        let b = client.encode("alpha protocol").unwrap();
        assert_eq!(a, b);
        assert_eq!(client.model_id(), "hash-256-1337");
    }

    #[test]
    fn empty_text_is_an_encode_error() {
        let client = EmbeddingClient::hash();
        let err = client.encode(" \n").unwrap_err();
        assert!(matches!(err, RetrievalError::Encode(_)));
    }

    #[test]
    fn unknown_provider_fails_at_construction() {
        let settings = EmbeddingSettings {
            provider: "sentence-transformers".to_string(),
            ..EmbeddingSettings::default()
        };
        assert!(EmbeddingClient::from_settings(&settings).is_err());
    }

    #[test]
    fn settings_choose_hash_dimensions() {
        let settings = EmbeddingSettings {
            dimensions: 32,
            seed: 9,
            ..EmbeddingSettings::default()
        };
        let client = EmbeddingClient::from_settings(&settings).unwrap();
        assert_eq!(client.model_id(), "hash-32-9");
        assert_eq!(client.encode("x y z").unwrap().len(), 32);
    }
}
