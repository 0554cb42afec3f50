//! Generative language model client.
//!
//! The service treats the model as an opaque call: a resolved prompt goes in,
//! text comes out. There are no retries: a failed call surfaces as an error
//! response to the browser.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for all generation calls.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

/// Boxed future returned by [`LanguageModel::generate`].
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// One generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// System instruction, typically a resolved prompt.
    pub system: Option<String>,
    /// User turn.
    pub user: String,
    /// Ask the model for a JSON object (`application/json` response type).
    pub json: bool,
    pub temperature: Option<f32>,
}

impl GenerateRequest {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user: text.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A text-generation backend.
pub trait LanguageModel: Send + Sync {
    fn generate<'a>(&'a self, request: &'a GenerateRequest) -> ModelFuture<'a>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

// ── Gemini wire types ──────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}

fn request_body(request: &GenerateRequest) -> GeminiRequest<'_> {
    GeminiRequest {
        system_instruction: request.system.as_deref().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part {
                text: &request.user,
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            response_mime_type: request.json.then_some("application/json"),
        },
    }
}

/// Concatenated text of the first candidate.
fn response_text(body: &str) -> Result<String, String> {
    let parsed: GeminiResponse =
        serde_json::from_str(body).map_err(|e| format!("failed to parse response: {e}"))?;
    if let Some(err) = parsed.error {
        return Err(format!("Gemini API error: {}", err.message));
    }
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        return Err("Gemini API returned no text".to_string());
    }
    Ok(text)
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("hp-support/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// Point at a different API base (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate_content(&self, request: &GenerateRequest) -> Result<String, String> {
        let body = request_body(request);
        debug!(
            "LLM request: model={}, system={} chars, user={} chars, json={}",
            self.model,
            request.system.as_ref().map_or(0, |s| s.len()),
            request.user.len(),
            request.json,
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("Gemini API HTTP {status}: {text}"));
        }
        response_text(&text)
    }
}

impl LanguageModel for GeminiClient {
    fn generate<'a>(&'a self, request: &'a GenerateRequest) -> ModelFuture<'a> {
        Box::pin(self.generate_content(request))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_system_and_json_mode() {
        let request = GenerateRequest::user("hi")
            .with_system("be brief")
            .with_temperature(0.7)
            .json();
        let value = serde_json::to_value(request_body(&request)).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn body_skips_unset_fields() {
        let value = serde_json::to_value(request_body(&GenerateRequest::user("x"))).unwrap();
        assert!(value.get("systemInstruction").is_none());
        assert!(value["generationConfig"].get("responseMimeType").is_none());
        assert!(value["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn response_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#;
        assert_eq!(response_text(body).unwrap(), "Hello world");
    }

    #[test]
    fn response_text_reports_api_errors() {
        let err = response_text(r#"{"error":{"message":"quota exceeded"}}"#).unwrap_err();
        assert!(err.contains("quota exceeded"));
        assert!(response_text(r#"{"candidates":[]}"#).is_err());
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new("k", "gemini-test")
            .unwrap()
            .with_base_url("http://localhost:1234/v1beta/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:1234/v1beta/models/gemini-test:generateContent"
        );
        assert_eq!(client.model_name(), "gemini-test");
    }
}
