//! Preview-editing support service.
//!
//! `hp-support` is the HTTP backend behind the website preview editor. The
//! browser records element selections, chats with a language model about
//! changes, and finally asks for a fix-instruction document compiled from the
//! whole conversation. Every prompt sent to the model is resolved through a
//! shared [`PromptCache`](hp_prompts::PromptCache), so prompt text can be
//! edited in the bucket and picked up without a redeploy.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hp_prompts::{CacheConfig, MemoryPromptStore, PromptCache};
//! use hp_support::{AppState, spawn_web};
//!
//! let cache = PromptCache::new(Arc::new(MemoryPromptStore::new()), CacheConfig::default());
//! let state = AppState::new(Arc::new(cache), None);
//! let addr = spawn_web(state, ([127, 0, 0, 1], 8080).into()).await?;
//! println!("listening on http://{addr}");
//! ```
//!
//! # Architecture
//!
//! ```text
//! browser ──HTTP──▶ api handlers ──resolve(name, vars)──▶ PromptCache ──▶ PromptStore
//!                        │                                    │
//!                        ├──▶ SessionStore (transcripts)      └──▶ FallbackCatalog
//!                        └──▶ LanguageModel (Gemini)
//! ```

mod api;
pub mod config;
pub mod model;
mod server;
pub mod session;

pub use api::{AppState, ChatReply, parse_chat_reply};
pub use config::ServiceConfig;
pub use model::{GeminiClient, GenerateRequest, LanguageModel, ModelFuture};
pub use server::build_router;
pub use session::{LogEntry, Session, SessionStore};

use std::net::SocketAddr;

/// Start the web server in a background task and return the bound address.
///
/// Binding to port 0 picks a free port; the returned address has the real one.
pub async fn spawn_web(state: AppState, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let router = server::build_router(state);
    server::start_server(router, bind_addr).await
}
