//! Service configuration from command-line flags and environment variables.
//!
//! Every flag has an environment fallback so the service can be configured
//! entirely through the container environment.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hp_prompts::{CacheConfig, DirPromptStore, GcsPromptStore, MemoryPromptStore, PromptStore};

use crate::model::{DEFAULT_GEMINI_MODEL, GeminiClient};

/// Preview-editing support service.
#[derive(Parser, Debug, Clone)]
#[command(name = "hp-support", about = "Preview-editing support service backed by a prompt cache")]
pub struct ServiceConfig {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port for the HTTP server.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// GCS bucket holding `prompts/<name>.txt` objects.
    #[arg(long, env = "PROMPTS_BUCKET_NAME")]
    pub prompts_bucket: Option<String>,

    /// Alternative GCS JSON API base, e.g. a storage emulator.
    #[arg(long, env = "GCS_ENDPOINT")]
    pub gcs_endpoint: Option<String>,

    /// Fixed OAuth bearer token for the prompts bucket. Without it the
    /// instance metadata server supplies short-lived tokens.
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub gcs_token: Option<String>,

    /// Talk to the bucket without credentials (public buckets).
    #[arg(long, env = "GCS_ANONYMOUS")]
    pub gcs_anonymous: bool,

    /// Local directory containing `prompts/<name>.txt`. Used when no bucket is set.
    #[arg(long, env = "PROMPTS_DIR")]
    pub prompts_dir: Option<PathBuf>,

    /// Minutes a fetched prompt is served before it is refreshed.
    #[arg(long, env = "PROMPT_CACHE_MINUTES", default_value_t = 60)]
    pub cache_minutes: u64,

    /// Upper bound, in seconds, on a single prompt store call.
    #[arg(long, env = "PROMPT_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Gemini API key. Without it the chat and fix-instruction endpoints are disabled.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini model name.
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub model: String,
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_cache_minutes(self.cache_minutes)
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
    }

    /// Pick the prompt store: bucket, then directory, then an empty in-memory
    /// store (every prompt then comes from the fallback catalog).
    pub fn build_store(&self) -> Result<Arc<dyn PromptStore>, String> {
        if let Some(ref bucket) = self.prompts_bucket {
            return Ok(Arc::new(self.build_gcs_store(bucket)?));
        }
        if let Some(ref dir) = self.prompts_dir {
            return Ok(Arc::new(DirPromptStore::new(dir.clone())));
        }
        Ok(Arc::new(MemoryPromptStore::new()))
    }

    /// GCS store with credentials: a fixed token if given, nothing for an
    /// emulator endpoint or `--gcs-anonymous`, otherwise the metadata server.
    fn build_gcs_store(&self, bucket: &str) -> Result<GcsPromptStore, String> {
        let mut store = GcsPromptStore::new(bucket).map_err(|e| e.to_string())?;
        if let Some(ref endpoint) = self.gcs_endpoint {
            store = store.with_endpoint(endpoint.clone());
        }
        if let Some(ref token) = self.gcs_token {
            store = store.with_token(token.clone());
        } else if self.gcs_endpoint.is_none() && !self.gcs_anonymous {
            store = store.with_metadata_credentials();
        }
        Ok(store)
    }

    /// The Gemini client, if an API key is configured.
    pub fn build_model(&self) -> Result<Option<GeminiClient>, String> {
        match self.gemini_api_key {
            Some(ref key) if !key.is_empty() => {
                GeminiClient::new(key.clone(), self.model.clone()).map(Some)
            }
            _ => Ok(None),
        }
    }
}
