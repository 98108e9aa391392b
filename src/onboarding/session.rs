//! Per-turn onboarding orchestration.
//!
//! Each turn classifies the history, wraps it with the onboarding persona and
//! the step's guidance, kicks off profile extraction in the background and
//! returns the reframed upstream stream.

use std::sync::Arc;

use tracing::{debug, info};

use super::prompts::ONBOARDING_SYSTEM_PROMPT;
use super::steps::{OnboardingStep, StepCatalog};
use crate::error::LlmError;
use crate::llm::{ChatMessage, Role};
use crate::memory::ProfileExtractor;
use crate::stream::{ProtocolStream, TokenSource, reframe};

/// Composes classifier, extraction trigger, token source and reframer.
pub struct OnboardingSession {
    token_source: Arc<dyn TokenSource>,
    extractor: Arc<dyn ProfileExtractor>,
    catalog: Arc<StepCatalog>,
    model: String,
    system_prompt: String,
}

impl OnboardingSession {
    pub fn new(
        token_source: Arc<dyn TokenSource>,
        extractor: Arc<dyn ProfileExtractor>,
        catalog: Arc<StepCatalog>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            token_source,
            extractor,
            catalog,
            model: model.into(),
            system_prompt: ONBOARDING_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the onboarding persona prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// `[system] ++ history ++ [assistant guidance]`.
    fn build_prompt(&self, step: &OnboardingStep, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));
        messages.extend(history);
        if !step.guidance_prompt.is_empty() {
            messages.push(ChatMessage::assistant(step.guidance_prompt.as_str()));
        }
        messages
    }

    /// Respond to one onboarding turn for `identity`.
    ///
    /// When the history has more than one message, the latest user message is
    /// handed to the extractor on a detached task before the upstream stream
    /// is opened. Extraction outcome never affects the response.
    pub async fn respond(
        &self,
        identity: &str,
        history: Vec<ChatMessage>,
    ) -> Result<ProtocolStream, LlmError> {
        let step = self.catalog.classify(history.len());
        info!(identity, step = %step.name, messages = history.len(), "Onboarding turn");

        if history.len() > 1 {
            let utterance = history
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.text());
            if let Some(utterance) = utterance {
                let extractor = Arc::clone(&self.extractor);
                let identity = identity.to_string();
                tokio::spawn(async move {
                    extractor.extract_and_store(&identity, &utterance).await;
                });
            } else {
                debug!(identity, "No user message to extract from");
            }
        }

        let messages = self.build_prompt(step, history);
        let fragments = self.token_source.stream(messages, &self.model).await?;
        Ok(reframe(fragments))
    }
}
