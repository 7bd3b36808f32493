//! Axum handlers for `/api/*` routes.
//!
//! Provider failures never surface as HTTP errors here: the chat handler
//! always answers 200 with the flattened reply.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AppState, session};

#[derive(Debug, Deserialize)]
pub(super) struct ChatRequest {
    /// Absent or empty messages are passed through unchanged.
    #[serde(default)]
    message: String,
    #[serde(default)]
    model: Option<String>,
}

/// Attach `Set-Cookie` when the session was created for this request.
fn with_cookie(mut resp: Response, cookie: Option<HeaderValue>) -> Response {
    if let Some(c) = cookie {
        resp.headers_mut().insert(header::SET_COOKIE, c);
    }
    resp
}

/// GET /api/status
pub(super) async fn status(State(state): State<AppState>) -> Response {
    let readiness = state.chat.readiness().await;
    debug!(valid = readiness.valid, "status requested");
    Json(readiness).into_response()
}

/// POST /api/chat
pub(super) async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    let (session_id, cookie) = session::resolve(&headers);
    let reply = state.chat.handle_chat(&session_id, req.message, req.model).await;
    with_cookie(Json(reply).into_response(), cookie)
}

/// POST /api/clear-chat
pub(super) async fn clear_chat(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, cookie) = session::resolve(&headers);
    state.chat.handle_clear(&session_id).await;
    let body = json!({ "status": "success", "message": "Conversation cleared" });
    with_cookie(Json(body).into_response(), cookie)
}
