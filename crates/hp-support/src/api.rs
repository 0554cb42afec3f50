//! REST API endpoint handlers.
//!
//! Every handler that talks to the language model first resolves its prompt
//! through the shared [`PromptCache`], so prompt edits in the store reach the
//! model without a redeploy.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use hp_prompts::PromptCache;
use hp_prompts::fallback::{CHAT_SYSTEM, FIX_INSTRUCTIONS, SELECTION_ANALYSIS};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::model::{GenerateRequest, LanguageModel};
use crate::session::{LogEntry, SessionStore};

/// History turns forwarded to the model with each chat message.
const CHAT_HISTORY_TURNS: usize = 3;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub prompts: Arc<PromptCache>,
    pub model: Option<Arc<dyn LanguageModel>>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(prompts: Arc<PromptCache>, model: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            prompts,
            model,
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

type ApiResponse = (StatusCode, Json<Value>);

fn failure(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    (
        status,
        Json(json!({"success": false, "error": message.into()})),
    )
}

fn model_unavailable() -> ApiResponse {
    failure(
        StatusCode::INTERNAL_SERVER_ERROR,
        "language model is not configured (set GEMINI_API_KEY)",
    )
}

// ── Health & admin ─────────────────────────────────────────────────

/// GET /health
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "hp-support",
        "gemini_configured": app.model.is_some(),
        "prompts_store": app.prompts.store_location(),
    }))
}

/// POST /api/admin/reload-prompts: Drop the prompt cache and reload it from the store.
pub async fn reload_prompts(State(app): State<AppState>) -> Json<Value> {
    let report = app.prompts.force_reload().await;
    Json(json!({
        "success": true,
        "message": "prompts reloaded",
        "loaded": report.names_loaded.len(),
        "names_loaded": report.names_loaded,
        "failed": report.failed,
        "timestamp": report.timestamp,
    }))
}

/// GET /api/admin/prompts: Currently cached prompts.
pub async fn list_prompts(State(app): State<AppState>) -> Json<Value> {
    let snapshot = app.prompts.snapshot();
    Json(json!({
        "success": true,
        "prompts": snapshot.entries,
        "last_loaded": snapshot.last_reload,
        "cache_minutes": snapshot.cache_minutes,
    }))
}

// ── Sessions ───────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub case_type: Option<String>,
    pub client_info: Option<Value>,
}

/// POST /api/sessions
pub async fn create_session(
    State(app): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> ApiResponse {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let id = app.sessions.create(body.case_type, body.client_info);
    info!("session {id} created");
    (
        StatusCode::CREATED,
        Json(json!({"success": true, "sessionId": id})),
    )
}

/// GET /api/sessions/{id}
pub async fn get_session(State(app): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    match app.sessions.get(&id) {
        Some(session) => (
            StatusCode::OK,
            Json(json!({"success": true, "session": session})),
        ),
        None => failure(StatusCode::NOT_FOUND, "session not found"),
    }
}

// ── Selections ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddSelectionRequest {
    pub session_id: Option<String>,
    pub selection: Option<Value>,
}

/// POST /api/add-selection: Record a preview selection and suggest a question about it.
pub async fn add_selection(
    State(app): State<AppState>,
    Json(body): Json<AddSelectionRequest>,
) -> ApiResponse {
    let (Some(session_id), Some(selection)) = (body.session_id, body.selection) else {
        return failure(
            StatusCode::BAD_REQUEST,
            "session_id and selection are required",
        );
    };

    let field = |key: &str| {
        selection
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let variables = hp_prompts::vars([
        ("selection_content", field("content")),
        ("selection_type", field("type")),
        ("user_comment", String::new()),
    ]);

    let entry = LogEntry::Selection {
        timestamp: Utc::now(),
        data: selection.clone(),
        user_comment: String::new(),
    };
    let Some(selection_id) = app.sessions.append(&session_id, entry) else {
        return failure(StatusCode::NOT_FOUND, "session not found");
    };

    let auto_question = app.prompts.resolve(SELECTION_ANALYSIS, &variables).await;
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "selection_id": selection_id,
            "auto_question": auto_question,
        })),
    )
}

// ── Chat ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ChatMessageRequest {
    #[serde(default)]
    pub message: String,
    pub session_id: Option<String>,
}

/// POST /chat-message: Plain conversational reply.
pub async fn chat_message(
    State(app): State<AppState>,
    Json(body): Json<ChatMessageRequest>,
) -> ApiResponse {
    let text = body.message.trim();
    if text.is_empty() {
        return failure(StatusCode::BAD_REQUEST, "message is empty");
    }
    let Some(model) = app.model.clone() else {
        return model_unavailable();
    };

    let system = app
        .prompts
        .resolve(CHAT_SYSTEM, &hp_prompts::Variables::new())
        .await;
    let request = GenerateRequest::user(format!("User: {text}")).with_system(system);

    match model.generate(&request).await {
        Ok(reply) => {
            if let Some(ref id) = body.session_id {
                app.sessions.append(
                    id,
                    LogEntry::Chat {
                        timestamp: Utc::now(),
                        user: text.to_string(),
                        ai: reply.clone(),
                    },
                );
            }
            (StatusCode::OK, Json(json!({"ai_response": reply})))
        }
        Err(e) => {
            error!("chat-message generation failed: {e}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub selection: Option<Value>,
    #[serde(default)]
    pub history: Vec<Value>,
    pub session_id: Option<String>,
}

/// The model's decision for a modification-chat message.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub modification: Option<Value>,
}

fn default_action() -> String {
    "question".to_string()
}

/// Parse the model's JSON answer. Tolerates a surrounding Markdown code
/// fence; anything unparseable becomes a `question` carrying the raw text.
pub fn parse_chat_reply(text: &str) -> ChatReply {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(unfenced).unwrap_or_else(|e| {
        warn!("model reply is not the expected JSON ({e}), treating it as a question");
        ChatReply {
            action: default_action(),
            response: trimmed.to_string(),
            modification: None,
        }
    })
}

fn chat_user_prompt(body: &ChatRequest) -> String {
    let pretty = |value: &Value| serde_json::to_string_pretty(value).unwrap_or_default();
    let selection = body.selection.as_ref().map_or("none".to_string(), pretty);
    let history = if body.history.is_empty() {
        "none".to_string()
    } else {
        let start = body.history.len().saturating_sub(CHAT_HISTORY_TURNS);
        pretty(&Value::Array(body.history[start..].to_vec()))
    };

    format!(
        "Selection:\n{selection}\n\nRecent conversation:\n{history}\n\n\
         User message:\n{}\n\nAnalyze the above and answer in JSON.",
        body.message
    )
}

/// POST /api/chat: Decide between an immediate modification, a batched
/// request, or a clarifying question.
pub async fn chat(State(app): State<AppState>, Json(body): Json<ChatRequest>) -> ApiResponse {
    if body.message.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "message is empty");
    }
    let Some(model) = app.model.clone() else {
        return model_unavailable();
    };

    let system = app
        .prompts
        .resolve(CHAT_SYSTEM, &hp_prompts::Variables::new())
        .await;
    let request = GenerateRequest::user(chat_user_prompt(&body))
        .with_system(system)
        .with_temperature(0.7)
        .json();

    let text = match model.generate(&request).await {
        Ok(text) => text,
        Err(e) => {
            error!("chat generation failed: {e}");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };
    let reply = parse_chat_reply(&text);

    if let Some(ref id) = body.session_id {
        app.sessions.append(
            id,
            LogEntry::ModificationChat {
                timestamp: Utc::now(),
                user: body.message.clone(),
                assistant: reply.response.clone(),
                action: reply.action.clone(),
                modification: reply.modification.clone(),
                selection: body.selection.clone(),
            },
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "action": reply.action,
            "response": reply.response,
            "modification": reply.modification,
        })),
    )
}

// ── Fix instructions ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct FixInstructionsRequest {
    pub session_id: Option<String>,
}

/// POST /api/generate-fix-instructions: Compile the session transcript into
/// a fix-instruction document.
pub async fn generate_fix_instructions(
    State(app): State<AppState>,
    Json(body): Json<FixInstructionsRequest>,
) -> ApiResponse {
    let session = body
        .session_id
        .as_deref()
        .and_then(|id| app.sessions.get(id))
        .filter(|s| !s.conversation_log.is_empty());
    let Some(session) = session else {
        return failure(
            StatusCode::BAD_REQUEST,
            "session not found or conversation log is empty",
        );
    };
    let Some(model) = app.model.clone() else {
        return model_unavailable();
    };

    let conversation_text = session.conversation_text();
    let prompt = app
        .prompts
        .resolve(
            FIX_INSTRUCTIONS,
            &hp_prompts::vars([
                (
                    "timestamp",
                    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                ),
                ("session_id", session.id.clone()),
                ("conversation_text", conversation_text.clone()),
            ]),
        )
        .await;
    info!(
        "generating fix instructions for session {} from {} chars of conversation",
        session.id,
        conversation_text.len()
    );

    match model.generate(&GenerateRequest::user(prompt)).await {
        Ok(instructions) => {
            app.sessions
                .push_fix_instructions(&session.id, instructions.clone());
            (
                StatusCode::OK,
                Json(json!({"success": true, "fix_instructions": instructions})),
            )
        }
        Err(e) => {
            error!("fix instruction generation failed: {e}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
