//! OpenAI-compatible chat completion provider.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::provider::CompletionProvider;
use crate::config::ProviderConfig;
use crate::types::*;

/// Provider speaking the `/v1/chat/completions` dialect.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: String,
    http: reqwest::Client,
}

// -- Request/response payloads ----------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    role: String,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            http,
        })
    }

    fn build_chat_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: request
                .messages
                .iter()
                .map(|m| MessagePayload {
                    role: m.role.to_string(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        }
    }
}

/// Turn a parsed chat response into the provider-neutral shape.
fn into_completion(body: ChatResponse, requested_model: &str) -> CompletionResponse {
    let model = body.model.unwrap_or_else(|| requested_model.to_string());
    let (content, finish_reason) = match body.choices.into_iter().next() {
        Some(choice) => (
            choice.message.content.unwrap_or_default(),
            FinishReason::parse(choice.finish_reason.as_deref()),
        ),
        None => (String::new(), FinishReason::Unknown),
    };

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    CompletionResponse {
        content,
        model,
        usage,
        finish_reason,
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty() && !self.model.is_empty()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            completion: true,
            embeddings: !self.embedding_model.is_empty(),
            function_calling: true,
            streaming: false,
            max_context_tokens: None,
            models: vec![self.model.clone()],
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let payload = self.build_chat_request(request);

        debug!("Completion request to model: {}", payload.model);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Completion request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Completion failed ({}): {}", status, body);
        }

        let body: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse completion response")?;

        Ok(into_completion(body, payload.model))
    }

    async fn embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.embedding_model.is_empty() {
            bail!("No embedding model configured for {}", self.name);
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.embedding_model,
                input: texts,
            })
            .send()
            .await
            .context("Embedding request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Embedding failed ({}): {}", status, body);
        }

        let mut body: EmbeddingResponse = resp
            .json()
            .await
            .context("Failed to parse embedding response")?;
        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.http.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Health check for {} failed: {}", self.name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(api_key: &str) -> OpenAiProvider {
        OpenAiProvider::new(&ProviderConfig {
            api_key: api_key.into(),
            api_key_env: String::new(),
            base_url: "https://example.test/".into(),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn missing_key_is_not_configured() {
        assert!(!provider("").is_configured());
        assert!(provider("sk-test").is_configured());
    }

    #[test]
    fn request_uses_override_model_and_roles() {
        let p = provider("sk-test");
        let req = CompletionRequest::new(vec![
            ChatMessage::system("rules"),
            ChatMessage::user("hello"),
        ])
        .with_model("gpt-4o")
        .with_top_p(0.9);

        let json = serde_json::to_value(p.build_chat_request(&req)).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert!((json["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn request_without_top_p_omits_field() {
        let p = provider("sk-test");
        let req = CompletionRequest::new(vec![ChatMessage::user("hello")]);
        let json = serde_json::to_value(p.build_chat_request(&req)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn response_parsing_maps_usage_and_finish_reason() {
        let body: ChatResponse = serde_json::from_str(
            r#"{
                "model": "gpt-4o-mini-2024",
                "choices": [{"message": {"content": "hi"}, "finish_reason": "length"}],
                "usage": {"prompt_tokens": 4, "completion_tokens": 1, "total_tokens": 5}
            }"#,
        )
        .unwrap();

        let resp = into_completion(body, "gpt-4o-mini");
        assert_eq!(resp.content, "hi");
        assert_eq!(resp.model, "gpt-4o-mini-2024");
        assert_eq!(resp.usage.total_tokens, 5);
        assert_eq!(resp.finish_reason, FinishReason::Length);
    }

    #[test]
    fn empty_choices_yield_empty_content() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let resp = into_completion(body, "fallback");
        assert_eq!(resp.content, "");
        assert_eq!(resp.model, "fallback");
        assert_eq!(resp.finish_reason, FinishReason::Unknown);
    }
}
