//! Streaming completions and the client data-stream protocol.
//!
//! A `TokenSource` yields `CompletionFragment`s from an upstream model;
//! `reframe` turns them into `ProtocolLine`s the client parses line by line.

pub mod openai;
pub mod protocol;
pub mod reframer;

pub use openai::OpenAiTokenSource;
pub use protocol::ProtocolLine;
pub use reframer::{ProtocolStream, reframe};

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::LlmError;
use crate::llm::{ChatMessage, FinishReason};

/// Token accounting reported with the finish event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One unit emitted by a token source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionFragment {
    /// Partial content.
    Delta { text: String },
    /// A choice-level terminal signal that is not the real finish event.
    Marker { reason: FinishReason },
    /// End of generation with usage. Exactly one per well-formed sequence.
    Finish {
        reason: FinishReason,
        usage: TokenUsage,
    },
}

impl CompletionFragment {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta { text: text.into() }
    }
}

/// Lazy fragment sequence returned by a token source.
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<CompletionFragment, LlmError>> + Send + 'static>>;

/// Produces incremental completion fragments for a message list.
///
/// Dropping the returned stream must release the upstream request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
    ) -> Result<FragmentStream, LlmError>;
}
