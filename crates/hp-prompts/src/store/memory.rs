//! In-memory prompt store with call counters.
//!
//! Used in tests (here and in downstream crates) and as the store of last
//! resort when the service has no bucket or directory configured, in which
//! case every prompt comes from the fallback catalog.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{PromptStore, StoreError, StoreFuture, is_valid_name};

#[derive(Default)]
pub struct MemoryPromptStore {
    prompts: Mutex<HashMap<String, String>>,
    unreachable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    lists: AtomicUsize,
}

impl MemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_prompt(self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
        self
    }

    pub fn insert(&self, name: impl Into<String>, content: impl Into<String>) {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), content.into());
    }

    pub fn remove(&self, name: &str) {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    /// While set, every call fails with [`StoreError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of `fetch` calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `list` calls made so far.
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), StoreError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable {
                location: self.describe(),
                reason: "simulated outage".into(),
            });
        }
        Ok(())
    }
}

impl PromptStore for MemoryPromptStore {
    fn fetch<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.simulate().await?;
            let prompts = self.prompts.lock().unwrap_or_else(|e| e.into_inner());
            Ok(prompts.get(name).cloned())
        })
    }

    fn list(&self) -> StoreFuture<'_, Vec<String>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            self.simulate().await?;
            let prompts = self.prompts.lock().unwrap_or_else(|e| e.into_inner());
            let mut names: Vec<String> = prompts
                .keys()
                .filter(|name| is_valid_name(name))
                .cloned()
                .collect();
            names.sort();
            Ok(names)
        })
    }

    fn describe(&self) -> String {
        "memory://prompts/".to_string()
    }
}
