//! OpenAI-compatible streaming chat completions as a `TokenSource`.
//!
//! Requests are sent with `stream: true` and `stream_options.include_usage`
//! so the provider closes the stream with a usage-only chunk, which becomes
//! the `Finish` fragment. Choice-level `finish_reason`s arrive earlier and
//! are surfaced as `Marker`s.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{StreamExt, stream};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{CompletionFragment, FragmentStream, TokenSource, TokenUsage};
use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::{ChatMessage, ContentPart, FinishReason, Role};

const PROVIDER: &str = "openai";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Streams chat completions from `{base_url}/chat/completions`.
pub struct OpenAiTokenSource {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiTokenSource {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

// ── Request body ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImage<'a> },
}

#[derive(Serialize)]
struct WireImage<'a> {
    url: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let content = message
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => WirePart::Text { text },
                ContentPart::ImageRef { url } => WirePart::ImageUrl {
                    image_url: WireImage { url },
                },
            })
            .collect();
        Self {
            role: message.role,
            content,
        }
    }
}

// ── Chunk decoding ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Result of decoding one SSE `data:` payload.
#[derive(Debug, PartialEq, Eq)]
enum Decoded {
    Done,
    Fragments(Vec<CompletionFragment>),
}

/// Turns SSE payloads into fragments, remembering the last choice-level
/// finish reason for the usage chunk.
#[derive(Debug)]
struct ChunkDecoder {
    model: String,
    last_reason: Option<FinishReason>,
}

impl ChunkDecoder {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            last_reason: None,
        }
    }

    fn decode(&mut self, data: &str) -> Result<Decoded, LlmError> {
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(Decoded::Done);
        }

        let value: serde_json::Value =
            serde_json::from_str(data).map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("undecodable chunk ({e}): {data}"),
            })?;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| error.as_str())
                .unwrap_or("error event in stream");
            return Err(LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: message.to_string(),
            });
        }

        let payload: ChunkPayload =
            serde_json::from_value(value).map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("unexpected chunk shape: {e}"),
            })?;

        let mut fragments = Vec::new();
        let mut saw_finish_reason = false;
        for choice in payload.choices.iter() {
            if let Some(text) = &choice.delta.content {
                fragments.push(CompletionFragment::delta(text.as_str()));
            }
            if let Some(raw) = &choice.finish_reason {
                let reason = FinishReason::from_openai(raw);
                self.last_reason = Some(reason);
                saw_finish_reason = true;
                fragments.push(CompletionFragment::Marker { reason });
            }
        }

        let finishes = payload.choices.is_empty() || saw_finish_reason;
        if let Some(usage) = payload.usage.filter(|_| finishes) {
            let reason = self.last_reason.unwrap_or_default();
            let cost = costs::estimate_cost(&self.model, usage.prompt_tokens, usage.completion_tokens);
            info!(
                model = %self.model,
                %reason,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                estimated_cost = %cost,
                "Upstream completion finished"
            );
            fragments.push(CompletionFragment::Finish {
                reason,
                usage: TokenUsage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                },
            });
        }

        Ok(Decoded::Fragments(fragments))
    }
}

// ── TokenSource ─────────────────────────────────────────────────────────

struct SseState<E> {
    events: E,
    decoder: ChunkDecoder,
    pending: VecDeque<CompletionFragment>,
}

#[async_trait]
impl TokenSource for OpenAiTokenSource {
    async fn stream(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
    ) -> Result<FragmentStream, LlmError> {
        let body = ChatCompletionBody {
            model,
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };

        debug!(model, messages = messages.len(), "Opening upstream stream");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                },
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                },
                _ => LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: format!("HTTP {status}: {text}"),
                },
            });
        }

        let state = SseState {
            events: Box::pin(response.bytes_stream().eventsource()),
            decoder: ChunkDecoder::new(model),
            pending: VecDeque::new(),
        };

        let fragments = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Some((Ok(fragment), Some(state)));
                }
                let event = match state.events.next().await {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        let err = LlmError::RequestFailed {
                            provider: PROVIDER.to_string(),
                            reason: format!("SSE stream error: {e}"),
                        };
                        return Some((Err(err), None));
                    }
                    None => return None,
                };
                trace!(data = %event.data, "Upstream SSE event");
                match state.decoder.decode(&event.data) {
                    Ok(Decoded::Done) => return None,
                    Ok(Decoded::Fragments(fragments)) => state.pending.extend(fragments),
                    Err(e) => return Some((Err(e), None)),
                }
            }
        });

        Ok(Box::pin(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn fragments(decoded: Decoded) -> Vec<CompletionFragment> {
        match decoded {
            Decoded::Fragments(f) => f,
            Decoded::Done => panic!("expected fragments"),
        }
    }

    #[test]
    fn decodes_content_delta() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        let out = decoder
            .decode(r#"{"object":"chat.completion.chunk","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#)
            .unwrap();
        assert_eq!(fragments(out), vec![CompletionFragment::delta("Hi")]);
    }

    #[test]
    fn empty_content_is_a_delta_but_missing_content_is_not() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        let empty = decoder
            .decode(r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#)
            .unwrap();
        assert_eq!(fragments(empty), vec![CompletionFragment::delta("")]);

        let missing = decoder
            .decode(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)
            .unwrap();
        assert!(fragments(missing).is_empty());
    }

    #[test]
    fn choice_finish_reason_becomes_marker() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        let out = decoder
            .decode(r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":null}"#)
            .unwrap();
        assert_eq!(
            fragments(out),
            vec![CompletionFragment::Marker {
                reason: FinishReason::Stop
            }]
        );
    }

    #[test]
    fn usage_chunk_finishes_with_remembered_reason() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        decoder
            .decode(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#)
            .unwrap();
        let out = decoder
            .decode(r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":7,"total_tokens":19}}"#)
            .unwrap();
        assert_eq!(
            fragments(out),
            vec![CompletionFragment::Finish {
                reason: FinishReason::Length,
                usage: TokenUsage {
                    prompt_tokens: 12,
                    completion_tokens: 7
                },
            }]
        );
    }

    #[test]
    fn usage_without_marker_defaults_to_stop() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        let out = decoder
            .decode(r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":0}}"#)
            .unwrap();
        assert!(matches!(
            fragments(out).as_slice(),
            [CompletionFragment::Finish {
                reason: FinishReason::Stop,
                ..
            }]
        ));
    }

    #[test]
    fn done_sentinel() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        assert_eq!(decoder.decode("[DONE]").unwrap(), Decoded::Done);
        assert_eq!(decoder.decode(" [DONE] ").unwrap(), Decoded::Done);
    }

    #[test]
    fn error_payload_is_rejected() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        let err = decoder
            .decode(r#"{"error":{"message":"overloaded","type":"server_error"}}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse { reason, .. } if reason == "overloaded"));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut decoder = ChunkDecoder::new("gpt-4");
        assert!(matches!(
            decoder.decode("not json"),
            Err(LlmError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn wire_message_uses_content_parts() {
        let message = ChatMessage::user("look").with_part(ContentPart::image("https://x/y.png"));
        let json = serde_json::to_value(WireMessage::from(&message)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "look"},
                    {"type": "image_url", "image_url": {"url": "https://x/y.png"}}
                ]
            })
        );
    }

    fn sse_body(events: &[&str]) -> String {
        events
            .iter()
            .map(|data| format!("data: {data}\n\n"))
            .collect()
    }

    #[tokio::test]
    async fn streams_fragments_from_server() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let server = MockServer::start().await;
            let body = sse_body(&[
                r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
                r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
                r#"{"choices":[{"delta":{"content":" world"}}]}"#,
                r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
                r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":2}}"#,
                "[DONE]",
            ]);
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .and(header("authorization", "Bearer sk-test"))
                .and(body_partial_json(serde_json::json!({
                    "model": "gpt-4",
                    "stream": true,
                    "stream_options": {"include_usage": true}
                })))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/event-stream")
                        .set_body_string(body),
                )
                .expect(1)
                .mount(&server)
                .await;

            let source = OpenAiTokenSource::new(
                format!("{}/v1", server.uri()),
                SecretString::from("sk-test"),
            );
            let stream = source
                .stream(vec![ChatMessage::user("hi")], "gpt-4")
                .await
                .unwrap();
            let items: Vec<_> = stream.collect().await;
            let items: Vec<CompletionFragment> =
                items.into_iter().map(|r| r.unwrap()).collect();

            assert_eq!(
                items,
                vec![
                    CompletionFragment::delta(""),
                    CompletionFragment::delta("Hello"),
                    CompletionFragment::delta(" world"),
                    CompletionFragment::Marker {
                        reason: FinishReason::Stop
                    },
                    CompletionFragment::Finish {
                        reason: FinishReason::Stop,
                        usage: TokenUsage {
                            prompt_tokens: 9,
                            completion_tokens: 2
                        },
                    },
                ]
            );
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn error_event_ends_stream_with_error() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let server = MockServer::start().await;
            let body = sse_body(&[
                r#"{"choices":[{"delta":{"content":"par"}}]}"#,
                r#"{"error":{"message":"upstream blew up"}}"#,
                r#"{"choices":[{"delta":{"content":"never"}}]}"#,
            ]);
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/event-stream")
                        .set_body_string(body),
                )
                .mount(&server)
                .await;

            let source = OpenAiTokenSource::new(server.uri(), SecretString::from("sk-test"));
            let items: Vec<_> = source
                .stream(vec![ChatMessage::user("hi")], "gpt-4")
                .await
                .unwrap()
                .collect()
                .await;
            assert_eq!(items.len(), 2);
            assert!(items[0].is_ok());
            assert!(matches!(items[1], Err(LlmError::InvalidResponse { .. })));
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn http_status_maps_to_error_kind() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let cases = [
                (401, None),
                (429, Some("7")),
                (500, None),
            ];
            for (status, retry_after) in cases {
                let server = MockServer::start().await;
                let mut template = ResponseTemplate::new(status).set_body_string("nope");
                if let Some(secs) = retry_after {
                    template = template.insert_header("retry-after", secs);
                }
                Mock::given(method("POST"))
                    .and(path("/chat/completions"))
                    .respond_with(template)
                    .mount(&server)
                    .await;

                let source = OpenAiTokenSource::new(server.uri(), SecretString::from("sk-bad"));
                let result = source.stream(vec![ChatMessage::user("hi")], "gpt-4").await;
                match status {
                    401 => assert!(matches!(result, Err(LlmError::AuthFailed { .. }))),
                    429 => assert!(matches!(
                        result,
                        Err(LlmError::RateLimited { retry_after: Some(d), .. }) if d == Duration::from_secs(7)
                    )),
                    _ => assert!(matches!(result, Err(LlmError::RequestFailed { .. }))),
                }
            }
        })
        .await
        .expect("test timed out");
    }
}
