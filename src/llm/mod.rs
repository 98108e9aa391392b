//! LLM integration.
//!
//! Supports:
//! - **OpenAI**: completions and embeddings via rig-core
//! - **Anthropic**: completions via rig-core
//!
//! The streaming chat path does not go through rig; see `crate::stream`.
//! rig is used for the one-shot extraction call and for embeddings, bridged
//! to our traits by `RigAdapter` and `RigEmbedder`.

pub mod costs;
pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::{RigAdapter, RigEmbedder};

use std::sync::Arc;

use rig::client::{CompletionClient, EmbeddingsClient};
use secrecy::ExposeSecret;

use crate::error::LlmError;
use crate::memory::vector::Embedder;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn openai_client(
    api_key: &secrecy::SecretString,
) -> Result<rig::client::Client<rig::providers::openai::client::OpenAIResponsesExt>, LlmError> {
    rig::providers::openai::Client::new(api_key.expose_secret()).map_err(|e| {
        LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: format!("Failed to create OpenAI client: {}", e),
        }
    })
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let client = openai_client(&config.api_key)?;
    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

/// Create an OpenAI embedder for profile summaries.
pub fn create_embedder(
    api_key: &secrecy::SecretString,
    model: &str,
) -> Result<Arc<dyn Embedder>, LlmError> {
    let client = openai_client(api_key)?;
    let embedding_model = client.embedding_model(model);
    tracing::info!("Using OpenAI embeddings (model: {})", model);
    Ok(Arc::new(RigEmbedder::new(embedding_model, model)))
}
