//! Companion: streaming chat and guided onboarding over the AI data-stream
//! protocol.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod onboarding;
pub mod store;
pub mod stream;

use tower_http::cors::CorsLayer;

/// All HTTP routes with permissive CORS.
pub fn router(
    chat: chat::ChatRouteState,
    onboarding: onboarding::OnboardingRouteState,
) -> axum::Router {
    chat::chat_routes(chat)
        .merge(onboarding::onboarding_routes(onboarding))
        .layer(CorsLayer::permissive())
}
