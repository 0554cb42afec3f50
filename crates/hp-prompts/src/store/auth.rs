//! Bearer tokens for the GCS prompt store.
//!
//! On Cloud Run and GCE the instance metadata server hands out short-lived
//! OAuth tokens for the attached service account. [`TokenSource::Metadata`]
//! caches one until shortly before it expires, then asks again. A static
//! token or anonymous access covers emulators and public buckets.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use super::StoreError;

/// Default service-account token endpoint of the instance metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Where [`GcsPromptStore`](super::GcsPromptStore) gets its bearer token.
pub enum TokenSource {
    /// No `Authorization` header.
    Anonymous,
    /// A fixed token. It is never refreshed.
    Static(String),
    /// Fetched from the metadata server and cached until near expiry.
    Metadata(MetadataCredentials),
}

/// Metadata-server endpoint plus the token cached from it.
pub struct MetadataCredentials {
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn metadata() -> Self {
        Self::metadata_at(METADATA_TOKEN_URL)
    }

    /// Metadata credentials from a non-default endpoint (tests, proxies).
    pub fn metadata_at(url: impl Into<String>) -> Self {
        Self::Metadata(MetadataCredentials {
            url: url.into(),
            cached: Mutex::new(None),
        })
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Static(_) => "static token",
            Self::Metadata(_) => "metadata server",
        }
    }

    /// The token to send, if any, refreshing a cached metadata token when
    /// it is about to expire.
    pub(crate) async fn token(
        &self,
        client: &reqwest::Client,
    ) -> Result<Option<String>, StoreError> {
        let (url, cached) = match self {
            Self::Anonymous => return Ok(None),
            Self::Static(token) => return Ok(Some(token.clone())),
            Self::Metadata(creds) => (&creds.url, &creds.cached),
        };

        let current = cached.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(token) = current
            && token.expires_at > Instant::now()
        {
            return Ok(Some(token.value));
        }

        let fresh = fetch_metadata_token(client, url).await?;
        let value = fresh.value.clone();
        *cached.lock().unwrap_or_else(|e| e.into_inner()) = Some(fresh);
        Ok(Some(value))
    }

    /// Drop a cached metadata token so the next call fetches a new one.
    pub(crate) fn invalidate(&self) {
        if let Self::Metadata(creds) = self {
            *creds.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }
}

async fn fetch_metadata_token(
    client: &reqwest::Client,
    url: &str,
) -> Result<CachedToken, StoreError> {
    let resp = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| StoreError::Auth(format!("metadata server request failed: {e}")))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| StoreError::Auth(format!("failed to read metadata token: {e}")))?;
    if !status.is_success() {
        return Err(StoreError::Auth(format!("metadata server HTTP {status}: {text}")));
    }

    let token: MetadataToken = serde_json::from_str(&text)
        .map_err(|e| StoreError::Auth(format!("failed to parse metadata token: {e}")))?;
    debug!("fetched GCS access token, expires in {}s", token.expires_in);

    let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
    Ok(CachedToken {
        value: token.access_token,
        expires_at: Instant::now() + lifetime,
    })
}
