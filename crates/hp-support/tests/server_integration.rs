//! Integration tests for the hp-support server.
//!
//! These tests start a real axum server on a random port, backed by an
//! in-memory prompt store and a stub language model, and exercise the REST
//! endpoints end to end.

use std::sync::{Arc, Mutex};

use hp_prompts::{CacheConfig, MemoryPromptStore, PromptCache};
use hp_support::{AppState, GenerateRequest, LanguageModel, ModelFuture, spawn_web};
use serde_json::{Value, json};

/// Returns a canned reply and records every request it receives.
struct StubModel {
    reply: String,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl StubModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LanguageModel for StubModel {
    fn generate<'a>(&'a self, request: &'a GenerateRequest) -> ModelFuture<'a> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server(
    store: Arc<MemoryPromptStore>,
    model: Option<Arc<StubModel>>,
) -> String {
    let cache = PromptCache::new(store, CacheConfig::default());
    let model = model.map(|m| m as Arc<dyn LanguageModel>);
    let state = AppState::new(Arc::new(cache), model);
    let addr = spawn_web(state, ([127, 0, 0, 1], 0).into()).await.unwrap();
    format!("http://{addr}")
}

async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn create_session(base: &str) -> String {
    let (status, json) = post(base, "/api/sessions", json!({"caseType": "renewal"})).await;
    assert_eq!(status, 201);
    json["sessionId"].as_str().unwrap().to_string()
}

// ── Health & admin ───────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_configuration() {
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), None).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["gemini_configured"], false);
    assert_eq!(json["prompts_store"], "memory://prompts/");
}

#[tokio::test]
async fn reload_then_list_prompts() {
    let store = Arc::new(
        MemoryPromptStore::new()
            .with_prompt("chat_system", "Be helpful.")
            .with_prompt("fix_instructions", "x".repeat(150)),
    );
    let base = spawn_test_server(store, None).await;

    let (status, json) = post(&base, "/api/admin/reload-prompts", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(json["success"], true);
    assert_eq!(json["loaded"], 2);
    assert!(json["timestamp"].is_string());

    let json: Value = reqwest::get(format!("{base}/api/admin/prompts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["cache_minutes"], 60);
    assert!(json["last_loaded"].is_string());
    let prompts = json["prompts"].as_array().unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0]["name"], "chat_system");
    assert_eq!(prompts[1]["name"], "fix_instructions");
    assert_eq!(prompts[1]["length"], 150);
    let preview = prompts[1]["preview"].as_str().unwrap();
    assert_eq!(preview, format!("{}...", "x".repeat(100)));
}

#[tokio::test]
async fn list_prompts_before_any_reload_is_empty() {
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), None).await;
    let json: Value = reqwest::get(format!("{base}/api/admin/prompts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(json["prompts"].as_array().unwrap().is_empty());
    assert!(json["last_loaded"].is_null());
}

// ── Sessions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn session_create_and_fetch() {
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), None).await;
    let id = create_session(&base).await;

    let resp = reqwest::get(format!("{base}/api/sessions/{id}")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["session"]["id"], id.as_str());
    assert_eq!(json["session"]["case_type"], "renewal");

    let resp = reqwest::get(format!("{base}/api/sessions/unknown")).await.unwrap();
    assert_eq!(resp.status(), 404);
}

// ── Selections ───────────────────────────────────────────────────────

#[tokio::test]
async fn add_selection_renders_remote_prompt() {
    let store = Arc::new(MemoryPromptStore::new().with_prompt(
        "selection_analysis",
        "Change the {selection_type} \"{selection_content}\"?{user_comment}",
    ));
    let base = spawn_test_server(store, None).await;
    let id = create_session(&base).await;

    let (status, json) = post(
        &base,
        "/api/add-selection",
        json!({"session_id": id, "selection": {"type": "heading", "content": "Welcome"}}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["selection_id"], 0);
    assert_eq!(json["auto_question"], "Change the heading \"Welcome\"?");
}

#[tokio::test]
async fn add_selection_falls_back_to_builtin_prompt() {
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), None).await;
    let id = create_session(&base).await;

    let (status, json) = post(
        &base,
        "/api/add-selection",
        json!({"session_id": id, "selection": {"type": "text", "content": "Opening hours"}}),
    )
    .await;
    assert_eq!(status, 200);
    let question = json["auto_question"].as_str().unwrap();
    assert!(question.contains("Opening hours"));
    assert!(!question.contains("{selection_content}"));
}

#[tokio::test]
async fn add_selection_rejects_bad_input() {
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), None).await;

    let (status, _) = post(&base, "/api/add-selection", json!({"session_id": "x"})).await;
    assert_eq!(status, 400);

    let (status, _) = post(
        &base,
        "/api/add-selection",
        json!({"session_id": "missing", "selection": {"content": "a"}}),
    )
    .await;
    assert_eq!(status, 404);
}

// ── Chat ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_parses_decision_and_logs_turn() {
    let model = StubModel::new(
        r#"{"action":"immediate","response":"Made it blue.","modification":{"selector":"h1","action":"style","styles":{"color":"blue"}}}"#,
    );
    let store = Arc::new(MemoryPromptStore::new().with_prompt("chat_system", "Remote chat rules."));
    let base = spawn_test_server(store, Some(model.clone())).await;
    let id = create_session(&base).await;

    let (status, json) = post(
        &base,
        "/api/chat",
        json!({"message": "make the title blue", "session_id": id, "selection": {"selector": "h1"}}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["action"], "immediate");
    assert_eq!(json["response"], "Made it blue.");
    assert_eq!(json["modification"]["styles"]["color"], "blue");

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system.as_deref(), Some("Remote chat rules."));
    assert!(requests[0].json);
    assert!(requests[0].user.contains("make the title blue"));

    let session: Value = reqwest::get(format!("{base}/api/sessions/{id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let log = session["session"]["conversation_log"].as_array().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["type"], "modification_chat");
    assert_eq!(log[0]["action"], "immediate");
}

#[tokio::test]
async fn chat_message_returns_reply() {
    let model = StubModel::new("Sure, I can help with that.");
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), Some(model)).await;

    let (status, json) = post(&base, "/chat-message", json!({"message": "hello"})).await;
    assert_eq!(status, 200);
    assert_eq!(json["ai_response"], "Sure, I can help with that.");
}

#[tokio::test]
async fn chat_without_model_is_server_error() {
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), None).await;

    let (status, json) = post(&base, "/api/chat", json!({"message": "hi"})).await;
    assert_eq!(status, 500);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("GEMINI_API_KEY"));
}

// ── Fix instructions ─────────────────────────────────────────────────

#[tokio::test]
async fn fix_instructions_use_rendered_prompt() {
    let model = StubModel::new("<h1>Fixes</h1>");
    let store = Arc::new(MemoryPromptStore::new().with_prompt(
        "fix_instructions",
        "Session {session_id} at {timestamp}\n{conversation_text}",
    ));
    let base = spawn_test_server(store, Some(model.clone())).await;
    let id = create_session(&base).await;

    post(&base, "/api/chat", json!({"message": "bigger logo", "session_id": id})).await;

    let (status, json) = post(
        &base,
        "/api/generate-fix-instructions",
        json!({"session_id": id}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["fix_instructions"], "<h1>Fixes</h1>");

    let requests = model.requests();
    let prompt = &requests.last().unwrap().user;
    assert!(prompt.starts_with(&format!("Session {id} at ")));
    assert!(prompt.contains("User: bigger logo"));
    assert!(!prompt.contains("{conversation_text}"));
}

#[tokio::test]
async fn fix_instructions_need_a_conversation() {
    let base = spawn_test_server(Arc::new(MemoryPromptStore::new()), Some(StubModel::new("x"))).await;
    let id = create_session(&base).await;

    let (status, json) = post(
        &base,
        "/api/generate-fix-instructions",
        json!({"session_id": id}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(json["success"], false);
}
