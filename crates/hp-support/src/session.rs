//! Per-session conversation transcripts.
//!
//! A session collects everything the user does while reviewing one preview:
//! element selections, chat turns, and the fix-instruction documents compiled
//! from them. Sessions are in-memory only and vanish on restart.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One transcript line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    /// The user picked an element in the preview.
    Selection {
        timestamp: DateTime<Utc>,
        data: Value,
        user_comment: String,
    },
    /// Plain conversational turn.
    Chat {
        timestamp: DateTime<Utc>,
        user: String,
        ai: String,
    },
    /// Turn from the modification chat, with the model's decision.
    ModificationChat {
        timestamp: DateTime<Utc>,
        user: String,
        assistant: String,
        action: String,
        modification: Option<Value>,
        selection: Option<Value>,
    },
}

/// A compiled fix-instruction document.
#[derive(Debug, Clone, Serialize)]
pub struct FixInstructions {
    pub instructions: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// `"new"` for a fresh site, otherwise whatever the client sent.
    pub case_type: String,
    pub client_info: Value,
    pub conversation_log: Vec<LogEntry>,
    pub fix_instructions: Vec<FixInstructions>,
}

impl Session {
    /// Chat turns formatted one per line for the fix-instruction prompt.
    pub fn conversation_text(&self) -> String {
        self.conversation_log
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Chat {
                    timestamp,
                    user,
                    ai,
                } => Some(format!("[{}] User: {user} / AI: {ai}", timestamp.to_rfc3339())),
                LogEntry::ModificationChat {
                    timestamp,
                    user,
                    assistant,
                    action,
                    ..
                } => Some(format!(
                    "[{}] User: {user} / AI ({action}): {assistant}",
                    timestamp.to_rfc3339()
                )),
                LogEntry::Selection { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Thread-safe map of live sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and return its id.
    pub fn create(&self, case_type: Option<String>, client_info: Option<Value>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session {
            id: id.clone(),
            created_at: Utc::now(),
            case_type: case_type.unwrap_or_else(|| "new".to_string()),
            client_info: client_info.unwrap_or_else(|| Value::Object(Default::default())),
            conversation_log: Vec::new(),
            fix_instructions: Vec::new(),
        };
        self.lock().insert(id.clone(), session);
        id
    }

    /// A copy of the session, if it exists.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.lock().get(id).cloned()
    }

    /// Append to the transcript. Returns the new entry's index, or `None`
    /// when the session does not exist.
    pub fn append(&self, id: &str, entry: LogEntry) -> Option<usize> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(id)?;
        session.conversation_log.push(entry);
        Some(session.conversation_log.len() - 1)
    }

    /// Record a generated fix-instruction document.
    pub fn push_fix_instructions(&self, id: &str, instructions: String) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(id) {
            Some(session) => {
                session.fix_instructions.push(FixInstructions {
                    instructions,
                    generated_at: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_defaults_case_type() {
        let store = SessionStore::new();
        let id = store.create(None, None);
        let session = store.get(&id).unwrap();
        assert_eq!(session.case_type, "new");
        assert_eq!(session.client_info, json!({}));
        assert!(session.conversation_log.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_returns_index_and_rejects_unknown_sessions() {
        let store = SessionStore::new();
        let id = store.create(Some("renewal".into()), None);
        let entry = LogEntry::Selection {
            timestamp: Utc::now(),
            data: json!({"content": "Hero title"}),
            user_comment: String::new(),
        };
        assert_eq!(store.append(&id, entry.clone()), Some(0));
        assert_eq!(store.append(&id, entry.clone()), Some(1));
        assert_eq!(store.append("missing", entry), None);
    }

    #[test]
    fn conversation_text_lists_chat_turns_only() {
        let store = SessionStore::new();
        let id = store.create(None, None);
        store.append(
            &id,
            LogEntry::Selection {
                timestamp: Utc::now(),
                data: json!({}),
                user_comment: String::new(),
            },
        );
        store.append(
            &id,
            LogEntry::Chat {
                timestamp: Utc::now(),
                user: "make it blue".into(),
                ai: "noted".into(),
            },
        );
        store.append(
            &id,
            LogEntry::ModificationChat {
                timestamp: Utc::now(),
                user: "bigger logo".into(),
                assistant: "done".into(),
                action: "immediate".into(),
                modification: None,
                selection: None,
            },
        );

        let text = store.get(&id).unwrap().conversation_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("User: make it blue / AI: noted"));
        assert!(lines[1].ends_with("User: bigger logo / AI (immediate): done"));
    }

    #[test]
    fn log_entries_serialize_with_type_tag() {
        let entry = LogEntry::Chat {
            timestamp: Utc::now(),
            user: "u".into(),
            ai: "a".into(),
        };
        let value = serde_json::to_value(entry).unwrap();
        assert_eq!(value["type"], "chat");

        let entry = LogEntry::ModificationChat {
            timestamp: Utc::now(),
            user: "u".into(),
            assistant: "a".into(),
            action: "batch".into(),
            modification: None,
            selection: None,
        };
        assert_eq!(serde_json::to_value(entry).unwrap()["type"], "modification_chat");
    }

    #[test]
    fn fix_instructions_require_existing_session() {
        let store = SessionStore::new();
        let id = store.create(None, None);
        assert!(store.push_fix_instructions(&id, "<h1>Fixes</h1>".into()));
        assert!(!store.push_fix_instructions("nope", "x".into()));
        assert_eq!(store.get(&id).unwrap().fix_instructions.len(), 1);
    }
}
