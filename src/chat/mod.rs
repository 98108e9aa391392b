//! Client chat payloads and the plain (non-onboarding) chat path.

pub mod routes;

pub use routes::{ChatRouteState, chat_routes};

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ChatError, LlmError};
use crate::llm::{ChatMessage, ContentPart, Role};
use crate::stream::{ProtocolStream, TokenSource, reframe};

/// An attachment as posted by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientAttachment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub url: String,
}

/// A message as posted by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub experimental_attachments: Vec<ClientAttachment>,
}

/// Request body for `/api/chat` and `/api/onboarding`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ClientMessage>,
}

fn parse_role(role: &str) -> Result<Role, ChatError> {
    match role {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        other => Err(ChatError::UnknownRole(other.to_string())),
    }
}

/// Convert client messages, keeping the primary text first and attachments
/// after it in client order.
pub fn convert_messages(messages: &[ClientMessage]) -> Result<Vec<ChatMessage>, ChatError> {
    messages
        .iter()
        .map(|message| {
            let mut content = vec![ContentPart::text(message.content.as_str())];
            for attachment in &message.experimental_attachments {
                if attachment.content_type.starts_with("image") {
                    content.push(ContentPart::image(attachment.url.as_str()));
                } else if attachment.content_type.starts_with("text") {
                    content.push(ContentPart::text(attachment.url.as_str()));
                } else {
                    debug!(
                        content_type = %attachment.content_type,
                        name = attachment.name.as_deref().unwrap_or(""),
                        "Dropping unsupported attachment"
                    );
                }
            }
            Ok(ChatMessage {
                role: parse_role(&message.role)?,
                content,
            })
        })
        .collect()
}

/// Streams a completion for the history as-is.
pub struct ChatService {
    token_source: Arc<dyn TokenSource>,
    model: String,
}

impl ChatService {
    pub fn new(token_source: Arc<dyn TokenSource>, model: impl Into<String>) -> Self {
        Self {
            token_source,
            model: model.into(),
        }
    }

    pub async fn respond(&self, history: Vec<ChatMessage>) -> Result<ProtocolStream, LlmError> {
        let fragments = self.token_source.stream(history, &self.model).await?;
        Ok(reframe(fragments))
    }
}
