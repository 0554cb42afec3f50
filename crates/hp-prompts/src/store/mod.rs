//! Durable prompt storage.
//!
//! Prompts live one per object at `prompts/<name>.txt` (UTF-8). Prompt authors
//! upload files following that convention, so [`prompt_path`] and
//! [`name_from_path`] are a hard contract. There is no manifest: the set of
//! prompts is whatever [`PromptStore::list`] discovers under the prefix.
//!
//! Every fetch has three outcomes that callers must keep apart in their logs:
//!
//! | Outcome      | Return value        |
//! |--------------|---------------------|
//! | found        | `Ok(Some(content))` |
//! | absent       | `Ok(None)`          |
//! | unreachable  | `Err(StoreError)`   |

pub mod auth;
pub mod dir;
pub mod gcs;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use auth::TokenSource;
pub use dir::DirPromptStore;
pub use gcs::GcsPromptStore;
pub use memory::MemoryPromptStore;

/// Namespace every prompt object lives under.
pub const PROMPT_PREFIX: &str = "prompts/";
/// Suffix of every prompt object.
pub const PROMPT_SUFFIX: &str = ".txt";

/// Boxed future returned by [`PromptStore`] methods.
///
/// Boxed so the trait stays dyn-compatible and can be injected as
/// `Arc<dyn PromptStore>`.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Why the store could not answer. Never fatal to prompt resolution.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport failure or an unexpected response from the store.
    #[error("prompt store {location} unreachable: {reason}")]
    Unreachable { location: String, reason: String },
    /// The store refused our credentials.
    #[error("prompt store rejected credentials: {0}")]
    Auth(String),
    /// The store did not answer within the configured fetch timeout.
    #[error("prompt store did not answer within {0:?}")]
    Timeout(Duration),
    /// The object exists but is not a usable prompt (e.g. not UTF-8).
    #[error("prompt object {path} is unusable: {reason}")]
    InvalidContent { path: String, reason: String },
}

/// A key-value blob store holding prompt templates.
pub trait PromptStore: Send + Sync {
    /// Fetch the raw template for `name` from [`prompt_path(name)`](prompt_path).
    fn fetch<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Names of every prompt object under [`PROMPT_PREFIX`].
    ///
    /// Objects that do not follow the path convention are skipped.
    fn list(&self) -> StoreFuture<'_, Vec<String>>;

    /// Human-readable location for logs and the health endpoint.
    fn describe(&self) -> String;
}

/// Whether `name` can be used as a prompt name.
///
/// Names are non-empty and limited to ASCII letters, digits, `_` and `-`, so
/// every name maps to exactly one object directly under the prefix.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Object path for a prompt name: `prompts/<name>.txt`.
pub fn prompt_path(name: &str) -> String {
    format!("{PROMPT_PREFIX}{name}{PROMPT_SUFFIX}")
}

/// Inverse of [`prompt_path`]. Returns `None` for paths outside the
/// convention, including nested paths like `prompts/old/x.txt`.
pub fn name_from_path(path: &str) -> Option<&str> {
    let name = path
        .strip_prefix(PROMPT_PREFIX)?
        .strip_suffix(PROMPT_SUFFIX)?;
    is_valid_name(name).then_some(name)
}

/// Decode object bytes as a UTF-8 prompt.
pub(crate) fn decode(path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
    String::from_utf8(bytes).map_err(|e| StoreError::InvalidContent {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_round_trip() {
        assert_eq!(prompt_path("chat_system"), "prompts/chat_system.txt");
        assert_eq!(name_from_path("prompts/chat_system.txt"), Some("chat_system"));
    }

    #[test]
    fn foreign_paths_are_rejected() {
        assert_eq!(name_from_path("prompts/readme.md"), None);
        assert_eq!(name_from_path("other/chat_system.txt"), None);
        assert_eq!(name_from_path("prompts/archive/old.txt"), None);
        assert_eq!(name_from_path("prompts/.txt"), None);
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("fix_instructions"));
        assert!(is_valid_name("chat-system-v2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../secrets"));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("with space"));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = decode("prompts/x.txt", vec![0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidContent { .. }));
        assert_eq!(decode("prompts/x.txt", b"ok".to_vec()).unwrap(), "ok");
    }
}
