//! Preview-editing support service.
//!
//! Serves the session, chat, and fix-instruction API used by the website
//! preview editor. Prompts come from a GCS bucket (`PROMPTS_BUCKET_NAME`), a
//! local directory (`PROMPTS_DIR`), or the built-in defaults.
//!
//! # Examples
//!
//! ```sh
//! # Prompts from a bucket, Gemini enabled
//! PROMPTS_BUCKET_NAME=hp-prompts GEMINI_API_KEY=... hp-support
//!
//! # Local prompt directory, refreshed every 5 minutes
//! hp-support --prompts-dir ./deploy --cache-minutes 5 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;
use hp_prompts::{PromptCache, REQUIRED_PROMPTS};
use hp_support::{AppState, LanguageModel, ServiceConfig, spawn_web};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    let config = ServiceConfig::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = match config.build_store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: failed to create prompt store: {e}");
            std::process::exit(1);
        }
    };

    let cache = PromptCache::new(store, config.cache_config());
    let missing = cache.fallback().missing(REQUIRED_PROMPTS);
    if !missing.is_empty() {
        warn!("no built-in default for required prompts: {}", missing.join(", "));
    }

    // Warm the cache so the first requests don't wait on the store.
    let report = cache.force_reload().await;
    info!(
        "prompt cache ready: {} prompts from {}, refreshed every {} min",
        report.names_loaded.len(),
        cache.store_location(),
        config.cache_minutes
    );

    let model: Option<Arc<dyn LanguageModel>> = match config.build_model() {
        Ok(Some(client)) => {
            info!("language model: {}", client.model_name());
            Some(Arc::new(client))
        }
        Ok(None) => {
            warn!("GEMINI_API_KEY not set; chat and fix-instruction endpoints will return errors");
            None
        }
        Err(e) => {
            eprintln!("Error: failed to create model client: {e}");
            std::process::exit(1);
        }
    };

    let state = AppState::new(Arc::new(cache), model);
    let addr = match spawn_web(state, config.bind_addr()).await {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Error: failed to bind {}: {e}", config.bind_addr());
            std::process::exit(1);
        }
    };
    info!("hp-support listening on http://{addr}");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
    info!("shutting down");
}
