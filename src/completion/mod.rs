pub mod cache;
pub mod manager;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use cache::{fingerprint, ResponseCache};
pub use manager::CompletionManager;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::CompletionProvider;

use anyhow::Result;
use std::sync::Arc;

use crate::config::{ProviderConfig, ProviderKind};

/// Build a provider from its config entry.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn CompletionProvider>> {
    let provider: Arc<dyn CompletionProvider> = match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config)?),
    };
    Ok(provider)
}
