//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves:
/// - `/health` and the legacy `/chat-message` endpoint
/// - the session, selection, chat, and fix-instruction API at `/api/*`
/// - prompt cache administration at `/api/admin/*`
pub fn build_router(state: AppState) -> Router {
    // The preview page is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health))
        .route("/chat-message", post(api::chat_message))
        .route("/api/sessions", post(api::create_session))
        .route("/api/sessions/{id}", get(api::get_session))
        .route("/api/add-selection", post(api::add_selection))
        .route("/api/chat", post(api::chat))
        .route(
            "/api/generate-fix-instructions",
            post(api::generate_fix_instructions),
        )
        .route("/api/admin/reload-prompts", post(api::reload_prompts))
        .route("/api/admin/prompts", get(api::list_prompts))
        .with_state(state)
        .layer(cors)
}

/// Bind the listener, spawn the server, and return the bound address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("HTTP server stopped: {e}");
        }
    });

    Ok(addr)
}
