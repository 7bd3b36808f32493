//! Axum HTTP server: JSON API over the chat service.
//!
//! ## URL layout
//!
//! ```text
//! GET  /api/status       → { valid, message }
//! POST /api/chat         → { response, usage }
//! POST /api/clear-chat   → { status, message }
//! ```
//!
//! Sessions are identified by the `chatrelay_session` cookie; see [`session`].

mod api;
pub mod session;

use std::sync::Arc;

use axum::{Router, routing::{get, post}};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chat::ChatService;
use crate::error::AppError;

/// Router state injected into every handler via [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status",     get(api::status))
        .route("/api/chat",       post(api::chat))
        .route("/api/clear-chat", post(api::clear_chat))
        .with_state(state)
}

/// Bind `bind_addr` and serve until `shutdown` is cancelled.
pub async fn serve(bind_addr: &str, chat: Arc<ChatService>, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = build_router(AppState { chat });

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("axum server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}
