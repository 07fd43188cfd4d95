//! Completion provider trait.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{CompletionRequest, CompletionResponse, ProviderCapabilities};

/// A pluggable language-model backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Registry key for this provider.
    fn name(&self) -> &str;

    /// Whether credentials and endpoint are present. Checked before any call.
    fn is_configured(&self) -> bool;

    fn capabilities(&self) -> ProviderCapabilities;

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    async fn embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn health_check(&self) -> bool;
}
