//! Ollama chat provider for locally hosted models.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::provider::CompletionProvider;
use crate::config::ProviderConfig;
use crate::types::*;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    name: String,
    base_url: String,
    model: String,
    embedding_model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: String,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: OllamaReply,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct OllamaReply {
    content: String,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            http,
        })
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    /// Local endpoints need no credentials.
    fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.model.is_empty()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            completion: true,
            embeddings: !self.embedding_model.is_empty(),
            function_calling: false,
            streaming: false,
            max_context_tokens: None,
            models: vec![self.model.clone()],
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let payload = OllamaChatRequest {
            model,
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.to_string(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                top_p: request.top_p,
            },
        };

        debug!("Ollama request to model: {}", model);

        let res = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("ollama request failed")?
            .error_for_status()
            .context("ollama non-2xx response")?
            .json::<OllamaChatResponse>()
            .await
            .context("ollama response decode failed")?;

        Ok(CompletionResponse {
            content: res.message.content,
            model: res.model.unwrap_or_else(|| model.to_string()),
            usage: TokenUsage {
                prompt_tokens: res.prompt_eval_count,
                completion_tokens: res.eval_count,
                total_tokens: res.prompt_eval_count + res.eval_count,
            },
            finish_reason: FinishReason::parse(res.done_reason.as_deref()),
        })
    }

    async fn embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = if self.embedding_model.is_empty() {
            &self.model
        } else {
            &self.embedding_model
        };

        let res = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&OllamaEmbedRequest {
                model,
                input: texts,
            })
            .send()
            .await
            .context("ollama embed request failed")?
            .error_for_status()
            .context("ollama embed non-2xx response")?
            .json::<OllamaEmbedResponse>()
            .await
            .context("ollama embed decode failed")?;

        Ok(res.embeddings)
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
