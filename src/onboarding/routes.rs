//! POST /api/onboarding: streaming onboarding turns.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};

use super::session::OnboardingSession;
use crate::chat::routes::{ApiError, DataStreamResponse, ProtocolQuery};
use crate::chat::{ChatRequest, convert_messages};
use crate::store::UserStore;

/// Header carrying the caller identity set by the auth proxy.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub session: Arc<OnboardingSession>,
    pub users: Arc<dyn UserStore>,
}

fn identity(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing user identity"))
}

/// POST /api/onboarding?protocol=data
///
/// Creates the user on first contact, then streams the onboarding turn keyed
/// by the internal user id.
async fn post_onboarding(
    State(state): State<OnboardingRouteState>,
    Query(query): Query<ProtocolQuery>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<DataStreamResponse, ApiError> {
    query.check()?;
    let external_id = identity(&headers)?;
    let history = convert_messages(&request.messages)?;

    let user = state.users.get_or_create(external_id).await?;
    let lines = state
        .session
        .respond(&user.id.to_string(), history)
        .await?;
    Ok(DataStreamResponse(lines))
}

/// Build the onboarding routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding", post(post_onboarding))
        .with_state(state)
}
