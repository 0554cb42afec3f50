//! Google Cloud Storage JSON API client for prompt objects.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, trace};

use super::auth::TokenSource;
use super::{PROMPT_PREFIX, PromptStore, StoreError, StoreFuture, decode, name_from_path, prompt_path};

pub const GCS_API_BASE: &str = "https://storage.googleapis.com/storage/v1";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectItem {
    name: String,
}

/// Prompt store backed by a GCS bucket.
///
/// Requests carry a bearer token from the configured [`TokenSource`].
/// The default is anonymous, which only public buckets and emulators accept.
pub struct GcsPromptStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    auth: TokenSource,
}

impl GcsPromptStore {
    /// Create a store for `bucket` against the public GCS endpoint.
    pub fn new(bucket: impl Into<String>) -> Result<Self, StoreError> {
        let bucket = bucket.into();
        let client = reqwest::Client::builder()
            .user_agent("hp-prompts/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Unreachable {
                location: format!("gs://{bucket}"),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: GCS_API_BASE.to_string(),
            bucket,
            auth: TokenSource::Anonymous,
        })
    }

    /// Point at a different API base, e.g. a local storage emulator.
    pub fn with_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a fixed `Authorization: Bearer <token>` with every request.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.with_token_source(TokenSource::Static(token.into()))
    }

    /// Use the service account of the Cloud Run / GCE instance.
    pub fn with_metadata_credentials(self) -> Self {
        self.with_token_source(TokenSource::metadata())
    }

    pub fn with_token_source(mut self, auth: TokenSource) -> Self {
        self.auth = auth;
        self
    }

    pub fn token_source(&self) -> &TokenSource {
        &self.auth
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/b/{}/o/{}?alt=media",
            self.base_url,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(path)
        )
    }

    fn list_url(&self, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/b/{}/o?prefix={}&fields=items(name),nextPageToken",
            self.base_url,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(PROMPT_PREFIX)
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, StoreError> {
        let mut request = self.client.get(url);
        if let Some(token) = self.auth.token(&self.client).await? {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|e| self.unreachable(format!("request failed: {e}")))
    }

    fn unreachable(&self, reason: String) -> StoreError {
        StoreError::Unreachable {
            location: self.describe(),
            reason,
        }
    }

    /// Map a non-success status (other than 404) to an error.
    async fn status_error(&self, resp: reqwest::Response) -> StoreError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Expired or revoked: fetch a new token on the next call.
            self.auth.invalidate();
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            StoreError::Auth(format!("HTTP {status}: {body}"))
        } else {
            self.unreachable(format!("HTTP {status}: {body}"))
        }
    }

    async fn fetch_object(&self, name: &str) -> Result<Option<String>, StoreError> {
        let path = prompt_path(name);
        let start = Instant::now();
        let resp = self.get(&self.object_url(&path)).await?;
        let status = resp.status();
        debug!(
            "GCS fetch {path}: HTTP {status} in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.status_error(resp).await);
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| self.unreachable(format!("failed to read object: {e}")))?;
        decode(&path, bytes.to_vec()).map(Some)
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let resp = self.get(&self.list_url(page_token.as_deref())).await?;
            if !resp.status().is_success() {
                return Err(self.status_error(resp).await);
            }
            let text = resp
                .text()
                .await
                .map_err(|e| self.unreachable(format!("failed to read listing: {e}")))?;
            let page: ListResponse = serde_json::from_str(&text)
                .map_err(|e| self.unreachable(format!("failed to parse listing: {e}")))?;

            for item in page.items {
                match name_from_path(&item.name) {
                    Some(name) => names.push(name.to_string()),
                    None => trace!("skipping non-prompt object {}", item.name),
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }
}

impl PromptStore for GcsPromptStore {
    fn fetch<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(self.fetch_object(name))
    }

    fn list(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(self.list_names())
    }

    fn describe(&self) -> String {
        format!("gs://{}/{PROMPT_PREFIX}", self.bucket)
    }
}
