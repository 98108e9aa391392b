//! HTTP endpoints for plain chat and health, plus the shared data-stream
//! response used by every streaming route.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;

use super::{ChatRequest, ChatService, convert_messages};
use crate::error::{ChatError, DatabaseError, LlmError};
use crate::stream::ProtocolStream;
use crate::stream::protocol::{DATA_STREAM_HEADER, DATA_STREAM_VERSION};

/// Shared state for chat routes.
#[derive(Clone)]
pub struct ChatRouteState {
    pub chat: Arc<ChatService>,
}

/// `?protocol=` query parameter. Only `data` is supported.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProtocolQuery {
    protocol: Option<String>,
}

impl ProtocolQuery {
    pub(crate) fn check(&self) -> Result<(), ChatError> {
        match self.protocol.as_deref() {
            None | Some("data") => Ok(()),
            Some(other) => Err(ChatError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// JSON error body with a status code.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        tracing::warn!(error = %e, "Failed to open upstream stream");
        Self::new(StatusCode::BAD_GATEWAY, e.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        tracing::error!(error = %e, "User store failure");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "user store unavailable")
    }
}

/// Streams protocol lines as the response body.
///
/// The line stream is the body itself: when the client goes away the body is
/// dropped and the upstream request with it. An error item aborts the body.
pub struct DataStreamResponse(pub ProtocolStream);

impl IntoResponse for DataStreamResponse {
    fn into_response(self) -> Response {
        let body = Body::from_stream(self.0.map(|line| line.map(|l| l.encode())));
        (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
                (
                    header::HeaderName::from_static(DATA_STREAM_HEADER),
                    DATA_STREAM_VERSION,
                ),
            ],
            body,
        )
            .into_response()
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "companion"}))
}

/// POST /api/chat?protocol=data
async fn post_chat(
    State(state): State<ChatRouteState>,
    Query(query): Query<ProtocolQuery>,
    Json(request): Json<ChatRequest>,
) -> Result<DataStreamResponse, ApiError> {
    query.check()?;
    let history = convert_messages(&request.messages)?;
    tracing::debug!(messages = history.len(), "Chat request");
    let lines = state.chat.respond(history).await?;
    Ok(DataStreamResponse(lines))
}

/// Build the chat and health routes.
pub fn chat_routes(state: ChatRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(post_chat))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::Request;
    use futures::stream;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::llm::{ChatMessage, FinishReason};
    use crate::stream::{CompletionFragment, FragmentStream, TokenSource, TokenUsage};

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Echoes the last message's text back as two deltas.
    struct EchoSource;

    #[async_trait]
    impl TokenSource for EchoSource {
        async fn stream(
            &self,
            messages: Vec<ChatMessage>,
            _model: &str,
        ) -> Result<FragmentStream, LlmError> {
            let last = messages.last().map(|m| m.text()).unwrap_or_default();
            let fragments = vec![
                Ok(CompletionFragment::delta("echo: ")),
                Ok(CompletionFragment::delta(last)),
                Ok(CompletionFragment::Finish {
                    reason: FinishReason::Stop,
                    usage: TokenUsage {
                        prompt_tokens: messages.len() as u32,
                        completion_tokens: 2,
                    },
                }),
            ];
            Ok(Box::pin(stream::iter(fragments)))
        }
    }

    struct DownSource;

    #[async_trait]
    impl TokenSource for DownSource {
        async fn stream(
            &self,
            _messages: Vec<ChatMessage>,
            _model: &str,
        ) -> Result<FragmentStream, LlmError> {
            Err(LlmError::AuthFailed {
                provider: "openai".to_string(),
            })
        }
    }

    fn app(source: Arc<dyn TokenSource>) -> Router {
        chat_routes(ChatRouteState {
            chat: Arc::new(ChatService::new(source, "gpt-4")),
        })
    }

    fn chat_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let response = app(Arc::new(EchoSource))
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["status"], "ok");
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn chat_streams_data_protocol() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let response = app(Arc::new(EchoSource))
                .oneshot(chat_request(
                    "/api/chat?protocol=data",
                    serde_json::json!({"messages": [{"role": "user", "content": "hi"}]}),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["x-vercel-ai-data-stream"], "v1");
            assert_eq!(response.headers()["cache-control"], "no-cache");
            assert_eq!(
                response.headers()["content-type"],
                "text/plain; charset=utf-8"
            );

            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(
                std::str::from_utf8(&body).unwrap(),
                "0:\"echo: \"\n0:\"hi\"\ne:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":1,\"completionTokens\":2},\"isContinued\":false}\n"
            );
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn protocol_defaults_to_data() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let response = app(Arc::new(EchoSource))
                .oneshot(chat_request(
                    "/api/chat",
                    serde_json::json!({"messages": []}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn unsupported_protocol_is_bad_request() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let response = app(Arc::new(EchoSource))
                .oneshot(chat_request(
                    "/api/chat?protocol=text",
                    serde_json::json!({"messages": []}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn unknown_role_is_bad_request() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let response = app(Arc::new(EchoSource))
                .oneshot(chat_request(
                    "/api/chat",
                    serde_json::json!({"messages": [{"role": "robot", "content": "x"}]}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        })
        .await
        .expect("test timed out");
    }

    #[tokio::test]
    async fn upstream_open_failure_is_bad_gateway() {
        tokio::time::timeout(TEST_TIMEOUT, async {
            let response = app(Arc::new(DownSource))
                .oneshot(chat_request(
                    "/api/chat",
                    serde_json::json!({"messages": [{"role": "user", "content": "x"}]}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(json["error"].as_str().unwrap().contains("Authentication"));
        })
        .await
        .expect("test timed out");
    }
}
