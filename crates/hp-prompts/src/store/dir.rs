//! Local directory prompt store.
//!
//! Mirrors the bucket layout on disk: `<root>/prompts/<name>.txt`. Handy for
//! development and for running the service without cloud credentials.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::trace;

use super::{PROMPT_PREFIX, PromptStore, StoreError, StoreFuture, decode, name_from_path, prompt_path};

pub struct DirPromptStore {
    root: PathBuf,
}

impl DirPromptStore {
    /// `root` is the directory that contains `prompts/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unreachable(&self, reason: String) -> StoreError {
        StoreError::Unreachable {
            location: self.describe(),
            reason,
        }
    }

    async fn read_prompt(&self, name: &str) -> Result<Option<String>, StoreError> {
        let path = prompt_path(name);
        match tokio::fs::read(self.root.join(&path)).await {
            Ok(bytes) => decode(&path, bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.unreachable(format!("failed to read {path}: {e}"))),
        }
    }

    async fn list_prompts(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(PROMPT_PREFIX);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.unreachable(format!("failed to list {}: {e}", dir.display()))),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.unreachable(format!("failed to list {}: {e}", dir.display())))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let path = format!("{PROMPT_PREFIX}{file_name}");
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            match name_from_path(&path) {
                Some(name) if is_file => names.push(name.to_string()),
                _ => trace!("skipping {path}"),
            }
        }
        names.sort();
        Ok(names)
    }
}

impl PromptStore for DirPromptStore {
    fn fetch<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(self.read_prompt(name))
    }

    fn list(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(self.list_prompts())
    }

    fn describe(&self) -> String {
        self.root.join(PROMPT_PREFIX).display().to_string()
    }
}
