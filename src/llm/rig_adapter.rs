//! Bridges rig-core completion and embedding models to our traits.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message as RigMessage};
use rig::embeddings::EmbeddingModel;
use rust_decimal::Decimal;

use crate::error::{LlmError, MemoryError};
use crate::llm::costs;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
use crate::memory::vector::Embedder;

/// `LlmProvider` over any rig `CompletionModel`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Rig has a single preamble slot, so system messages are folded into it.
fn split_preamble(messages: &[ChatMessage]) -> (Option<String>, Vec<RigMessage>) {
    let mut preamble_parts = Vec::new();
    let mut history = Vec::new();

    for message in messages {
        let text = message.text();
        match message.role {
            Role::System => {
                if !text.trim().is_empty() {
                    preamble_parts.push(text);
                }
            }
            Role::User => history.push(RigMessage::user(text)),
            Role::Assistant => history.push(RigMessage::assistant(text)),
        }
    }

    let preamble = if preamble_parts.is_empty() {
        None
    } else {
        Some(preamble_parts.join("\n\n"))
    };
    (preamble, history)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_cost(&self.model_name).unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, mut history) = split_preamble(&request.messages);

        let Some(prompt) = history.pop() else {
            return Err(LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: "no user or assistant message to complete".to_string(),
            });
        };

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content = response
            .choice
            .iter()
            .filter_map(|item| match item {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let input_tokens = u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX);
        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        tracing::debug!(
            model = %self.model_name,
            input_tokens,
            output_tokens,
            "Completion finished"
        );

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            finish_reason: FinishReason::Stop,
        })
    }
}

/// `Embedder` over any rig `EmbeddingModel`.
pub struct RigEmbedder<E> {
    model: E,
    model_name: String,
}

impl<E> RigEmbedder<E> {
    pub fn new(model: E, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<E> Embedder for RigEmbedder<E>
where
    E: EmbeddingModel + Send + Sync + 'static,
{
    fn dimensions(&self) -> usize {
        self.model.ndims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let embedding = self
            .model
            .embed_text(text)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed {
                reason: format!("{}: {e}", self.model_name),
            })?;
        Ok(embedding.vec.into_iter().map(|v| v as f32).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_fold_into_preamble() {
        let messages = vec![
            ChatMessage::system("be kind"),
            ChatMessage::system("output JSON"),
            ChatMessage::user("hello"),
        ];
        let (preamble, history) = split_preamble(&messages);
        assert_eq!(preamble.as_deref(), Some("be kind\n\noutput JSON"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn blank_system_message_is_dropped() {
        let messages = vec![ChatMessage::system("   "), ChatMessage::user("hello")];
        let (preamble, history) = split_preamble(&messages);
        assert!(preamble.is_none());
        assert_eq!(history.len(), 1);
    }
}
