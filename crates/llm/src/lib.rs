use anyhow::{anyhow, Context, Result};
use reqwest::{header::HeaderValue, Client, StatusCode};
use serde_json::{json, Value};
use std::env;
use tokio::runtime::Runtime;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-3.5-turbo-16k",
            LlmProvider::Local => "local",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
}

/// Generation backend. Errors from the remote side are returned as-is so
/// callers see the provider's own message.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    OpenAi(OpenAiConfig),
    Local,
}

#[derive(Clone)]
struct OpenAiConfig {
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let config = match provider {
            LlmProvider::OpenAi => ProviderConfig::OpenAi(OpenAiConfig {
                api_key: read_api_key("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            }),
            LlmProvider::Local => ProviderConfig::Local,
        };
        Ok(Self {
            http: Client::new(),
            provider,
            model: model.into(),
            config,
        })
    }

    pub fn local() -> Self {
        Self {
            http: Client::new(),
            provider: LlmProvider::Local,
            model: LlmProvider::Local.default_model().to_string(),
            config: ProviderConfig::Local,
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        match &self.config {
            ProviderConfig::OpenAi(cfg) => self.chat_openai(cfg, req).await,
            ProviderConfig::Local => Ok(self.chat_local(req)),
        }
    }

    pub fn chat_blocking(&self, req: &LlmRequest) -> Result<LlmResponse> {
        if let ProviderConfig::Local = self.config {
            return Ok(self.chat_local(req));
        }
        let rt = Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(self.chat(req))
    }

    /// Single-turn completion of `prompt` with the configured model.
    pub fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.chat_blocking(&LlmRequest {
            user: prompt.to_string(),
        })?;
        Ok(response.content)
    }

    async fn chat_openai(&self, cfg: &OpenAiConfig, req: &LlmRequest) -> Result<LlmResponse> {
        const MAX_RETRIES: usize = 6;
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": req.user }],
        });
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(&url)
                .bearer_auth(&cfg.api_key)
                .json(&payload)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt > MAX_RETRIES {
                        return Err(err).with_context(|| "openai request failed");
                    }
                    sleep(backoff_delay(attempt, None)).await;
                    continue;
                }
            };
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt > MAX_RETRIES {
                    return Err(anyhow!("openai rate limited after {MAX_RETRIES} retries"));
                }
                let wait = backoff_delay(attempt, response.headers().get("retry-after"));
                sleep(wait).await;
                continue;
            }
            let value = decode_openai_body(response).await?;
            let content = extract_openai_text(&value)
                .ok_or_else(|| anyhow!("missing text in OpenAI response"))?;
            return Ok(LlmResponse { content });
        }
    }

    fn chat_local(&self, req: &LlmRequest) -> LlmResponse {
        LlmResponse {
            content: synthesize_local_answer(&req.user),
        }
    }
}

fn backoff_delay(attempt: usize, retry_after: Option<&HeaderValue>) -> Duration {
    if let Some(value) = retry_after {
        if let Ok(text) = value.to_str() {
            if let Ok(secs) = text.parse::<u64>() {
                return Duration::from_secs(secs.max(1));
            }
        }
    }
    let capped = attempt.min(6) as u32;
    Duration::from_secs(1u64 << capped)
}

/// Offline stand-in: quotes the opening of the first retrieved excerpt so
/// the pipeline can run end to end without network access.
fn synthesize_local_answer(prompt: &str) -> String {
    let excerpt = extract_between(prompt, "Content:", &["Knowledgebase Top", "\n###"]);
    if excerpt.is_empty() {
        return "No knowledge-base content was provided.".to_string();
    }
    format!("Based on the top excerpt: {}", summarize_text(&excerpt, 40))
}

fn extract_between(text: &str, start_marker: &str, stop_markers: &[&str]) -> String {
    let Some(start_idx) = text.find(start_marker) else {
        return String::new();
    };
    let after = &text[start_idx + start_marker.len()..];
    let end_idx = stop_markers
        .iter()
        .filter_map(|marker| after.find(marker))
        .min()
        .unwrap_or(after.len());
    after[..end_idx].trim().to_string()
}

fn summarize_text(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
}

async fn decode_openai_body(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(
            "openai returned error (status {}): {}",
            status,
            body
        ));
    }
    serde_json::from_str(&body).context("failed to decode openai response")
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!("{var} is not set"))?;
    if value.trim().is_empty() {
        return Err(anyhow!("{var} is empty"));
    }
    Ok(value)
}

fn extract_openai_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }
    let content = choice.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    content
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(|t| t.as_str()))
        .map(str::to_string)
}
