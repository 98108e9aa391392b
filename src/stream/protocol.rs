//! Data-stream protocol lines (`x-vercel-ai-data-stream: v1`).
//!
//! Two frame shapes are emitted, one per line:
//! - `0:<json string>` for text deltas
//! - `e:{"finishReason":..,"usage":{..},"isContinued":false}` for the finish step

use serde::Serialize;

use crate::llm::FinishReason;

/// Response header declaring the framing version.
pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

/// One wire-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolLine {
    Data {
        text: String,
    },
    Finish {
        reason: FinishReason,
        prompt_tokens: u32,
        completion_tokens: u32,
        is_continued: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishFrame<'a> {
    finish_reason: &'a str,
    usage: UsageFrame,
    is_continued: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageFrame {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ProtocolLine {
    pub fn data(text: impl Into<String>) -> Self {
        Self::Data { text: text.into() }
    }

    /// Render the newline-terminated frame.
    pub fn encode(&self) -> String {
        match self {
            Self::Data { text } => {
                // Serializing a &str cannot fail.
                let encoded = serde_json::to_string(text).unwrap_or_default();
                format!("0:{encoded}\n")
            }
            Self::Finish {
                reason,
                prompt_tokens,
                completion_tokens,
                is_continued,
            } => {
                let frame = FinishFrame {
                    finish_reason: reason.as_str(),
                    usage: UsageFrame {
                        prompt_tokens: *prompt_tokens,
                        completion_tokens: *completion_tokens,
                    },
                    is_continued: *is_continued,
                };
                let encoded = serde_json::to_string(&frame).unwrap_or_default();
                format!("e:{encoded}\n")
            }
        }
    }
}
