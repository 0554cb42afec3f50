//! The prompt cache: freshness policy, fallback precedence, and admin surface.
//!
//! [`PromptCache::resolve`] never fails and never returns empty content. The
//! raw template is chosen in strict precedence order:
//!
//! 1. the cached remote entry (fresh, or stale when the refresh failed),
//! 2. the [`FallbackCatalog`] entry,
//! 3. a generic not-found literal naming the prompt.
//!
//! A stale or missing entry triggers a remote fetch bounded by
//! [`CacheConfig::fetch_timeout`]. Concurrent stale readers may each fetch;
//! the last successful fetch wins. Entries are stored behind `Arc` and only
//! ever replaced whole, so a reader sees either the old or the new entry.
//!
//! The first resolution of a name always leaves an entry behind, remote or
//! fallback, and every fetch attempt restarts that entry's window. A store
//! that is down or slow is therefore asked at most once per window per name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::fallback::FallbackCatalog;
use crate::render::{Variables, try_render};
use crate::store::{PromptStore, StoreError, is_valid_name};

/// Characters of template text shown per entry in [`CacheSnapshot`].
pub const PREVIEW_CHARS: usize = 100;

/// Tuning for [`PromptCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a remote entry is served before the next access refreshes
    /// it. Default: 60 minutes.
    pub freshness_window: Duration,
    /// Upper bound on a single store call. Default: 10 seconds.
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(60 * 60),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Freshness window in whole minutes, the unit operators configure.
    pub fn with_cache_minutes(self, minutes: u64) -> Self {
        self.with_freshness_window(Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// A cached template, where it came from, and when.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub template: String,
    /// [`PromptOrigin::Remote`] or [`PromptOrigin::Fallback`].
    pub origin: PromptOrigin,
    /// When `template` was obtained.
    pub refreshed_at: DateTime<Utc>,
    /// Last fetch attempt, successful or not. Staleness is measured from here.
    pub checked_at: DateTime<Utc>,
}

/// Which layer supplied a resolved prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptOrigin {
    /// The remote store, either just fetched or cached.
    Remote,
    /// The builtin fallback catalog.
    Fallback,
    /// No layer knew the name; the not-found literal was served.
    Missing,
}

/// What the store said when a resolution had to ask it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Usable content was fetched and cached.
    Fetched,
    /// The store answered but holds no usable object for the name.
    Absent,
    /// The store could not be asked: transport, auth, or timeout.
    Unreachable,
}

/// Outcome of [`PromptCache::resolve_detailed`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The final prompt text. Never empty.
    pub content: String,
    pub origin: PromptOrigin,
    /// `false` when variables were missing and the raw template was returned.
    pub rendered: bool,
    /// `None` when the cached entry was fresh or the name never reached the store.
    pub refresh: Option<RefreshOutcome>,
}

/// Result of [`PromptCache::force_reload`].
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    /// Names now cached from the store, sorted.
    pub names_loaded: Vec<String>,
    /// Names the listing reported but that could not be fetched.
    pub failed: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub refreshed_at: DateTime<Utc>,
    /// Template length in characters.
    pub length: usize,
    /// First [`PREVIEW_CHARS`] characters, with `...` appended when cut.
    pub preview: String,
}

/// Read-only view of the cache for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub entries: Vec<SnapshotEntry>,
    pub last_reload: Option<DateTime<Utc>>,
    pub cache_minutes: u64,
}

/// Resolves named prompts against a remote store with a fallback catalog.
///
/// Construct one per process and share it behind an `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use hp_prompts::{CacheConfig, MemoryPromptStore, PromptCache, vars};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(MemoryPromptStore::new().with_prompt("greet", "Hello {name}"));
/// let cache = PromptCache::new(store, CacheConfig::default());
///
/// assert_eq!(cache.resolve("greet", &vars([("name", "Ada")])).await, "Hello Ada");
/// // Unknown everywhere: still non-empty.
/// assert!(!cache.resolve("nope", &Default::default()).await.is_empty());
/// # }
/// ```
pub struct PromptCache {
    store: Arc<dyn PromptStore>,
    fallback: FallbackCatalog,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    last_reload: RwLock<Option<DateTime<Utc>>>,
}

impl PromptCache {
    /// A cache over `store` with the builtin fallback catalog and wall-clock time.
    pub fn new(store: Arc<dyn PromptStore>, config: CacheConfig) -> Self {
        Self {
            store,
            fallback: FallbackCatalog::builtin(),
            clock: Arc::new(SystemClock),
            config,
            entries: RwLock::new(HashMap::new()),
            last_reload: RwLock::new(None),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackCatalog) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn fallback(&self) -> &FallbackCatalog {
        &self.fallback
    }

    /// Where prompts are fetched from, for logs and health output.
    pub fn store_location(&self) -> String {
        self.store.describe()
    }

    /// Resolve `name` and render it with `variables`.
    pub async fn resolve(&self, name: &str, variables: &Variables) -> String {
        self.resolve_detailed(name, variables).await.content
    }

    /// Like [`resolve`](Self::resolve), also reporting the origin layer and
    /// whether substitution succeeded.
    pub async fn resolve_detailed(&self, name: &str, variables: &Variables) -> Resolution {
        let mut entry = self.entry(name);
        let mut refresh = None;

        if entry.as_ref().is_none_or(|e| self.is_stale(e)) {
            if is_valid_name(name) {
                let (outcome, template) = self.fetch_remote(name).await;
                refresh = Some(outcome);
                entry = self.settle(name, entry, template);
            } else {
                warn!("prompt name {name:?} is malformed, skipping the prompt store");
            }
        }

        let (raw, origin) = match entry {
            Some(entry) => {
                debug!("prompt {name}: serving cached {:?} content", entry.origin);
                (entry.template.clone(), entry.origin)
            }
            None => match self.fallback.get(name) {
                Some(template) => {
                    debug!("prompt {name}: serving fallback catalog content");
                    (template.to_string(), PromptOrigin::Fallback)
                }
                None => {
                    warn!("prompt {name:?} is unknown to the store and the fallback catalog");
                    (not_found_literal(name), PromptOrigin::Missing)
                }
            },
        };

        let (content, rendered) = match try_render(&raw, variables) {
            Ok(content) if !content.trim().is_empty() => (content, true),
            Ok(_) => {
                warn!("prompt {name}: rendering produced empty text, serving the raw template");
                (raw, false)
            }
            Err(missing) => {
                warn!(prompt = name, missing = ?missing.0, "prompt left unrendered: {missing}");
                (raw, false)
            }
        };

        Resolution {
            content,
            origin,
            rendered,
            refresh,
        }
    }

    /// Drop every entry and reload all prompts the store lists.
    ///
    /// The new map is built off to the side and swapped in at once. Names
    /// that fail to fetch are left without an entry, so their next
    /// [`resolve`](Self::resolve) falls back to the catalog (after one more
    /// fetch attempt).
    pub async fn force_reload(&self) -> ReloadReport {
        let timestamp = self.clock.now();

        let listed = match self.bounded(self.store.list()).await {
            Ok(names) => names,
            Err(e) => {
                warn!("prompt reload: listing {} failed: {e}", self.store.describe());
                Vec::new()
            }
        };

        let fetches = listed.iter().map(|name| async move {
            let outcome = self.bounded(self.store.fetch(name)).await;
            (name, outcome)
        });
        let results = futures::future::join_all(fetches).await;

        let mut fresh = HashMap::new();
        let mut names_loaded = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in results {
            match outcome {
                Ok(Some(template)) if !template.trim().is_empty() => {
                    fresh.insert(
                        name.clone(),
                        Arc::new(CacheEntry {
                            template,
                            origin: PromptOrigin::Remote,
                            refreshed_at: timestamp,
                            checked_at: timestamp,
                        }),
                    );
                    names_loaded.push(name.clone());
                }
                Ok(Some(_)) => {
                    warn!("prompt reload: {name} is empty in the store, skipping");
                    failed.push(name.clone());
                }
                Ok(None) => {
                    info!("prompt reload: {name} disappeared from the store after listing");
                    failed.push(name.clone());
                }
                Err(e) => {
                    warn!("prompt reload: fetching {name} failed: {e}");
                    failed.push(name.clone());
                }
            }
        }
        names_loaded.sort();
        failed.sort();

        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        *self.last_reload.write().unwrap_or_else(|e| e.into_inner()) = Some(timestamp);

        info!(
            "prompt reload from {}: {} loaded, {} failed",
            self.store.describe(),
            names_loaded.len(),
            failed.len()
        );

        ReloadReport {
            names_loaded,
            failed,
            timestamp,
        }
    }

    /// Remotely-sourced cache contents, sorted by name. Fallback entries are
    /// left out so the listing reflects what the store actually holds.
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut entries: Vec<SnapshotEntry> = {
            let map = self.entries.read().unwrap_or_else(|e| e.into_inner());
            map.iter()
                .filter(|(_, entry)| entry.origin == PromptOrigin::Remote)
                .map(|(name, entry)| SnapshotEntry {
                    name: name.clone(),
                    refreshed_at: entry.refreshed_at,
                    length: entry.template.chars().count(),
                    preview: preview(&entry.template),
                })
                .collect()
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        CacheSnapshot {
            entries,
            last_reload: *self.last_reload.read().unwrap_or_else(|e| e.into_inner()),
            cache_minutes: self.config.freshness_window.as_secs() / 60,
        }
    }

    fn entry(&self, name: &str) -> Option<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Stale once strictly more than the freshness window has elapsed since
    /// the last fetch attempt.
    fn is_stale(&self, entry: &CacheEntry) -> bool {
        let window = TimeDelta::from_std(self.config.freshness_window).unwrap_or(TimeDelta::MAX);
        self.clock.now().signed_duration_since(entry.checked_at) > window
    }

    /// Ask the store for `name`. Returns usable content only on `Fetched`.
    async fn fetch_remote(&self, name: &str) -> (RefreshOutcome, Option<String>) {
        match self.bounded(self.store.fetch(name)).await {
            Ok(Some(template)) if !template.trim().is_empty() => {
                info!("prompt {name}: refreshed from {}", self.store.describe());
                (RefreshOutcome::Fetched, Some(template))
            }
            Ok(Some(_)) => {
                warn!("prompt {name}: store object is empty, ignoring it");
                (RefreshOutcome::Absent, None)
            }
            Ok(None) => {
                info!("prompt {name}: absent from {}", self.store.describe());
                (RefreshOutcome::Absent, None)
            }
            Err(e) => {
                warn!("prompt {name}: store unreachable, keeping previous content: {e}");
                (RefreshOutcome::Unreachable, None)
            }
        }
    }

    /// Install the result of a fetch attempt and return the entry to serve.
    ///
    /// New content replaces the entry. Otherwise the previous entry is kept
    /// with a new `checked_at`, or, for a first resolution, the fallback
    /// template is cached. Names unknown to the catalog get no entry.
    fn settle(
        &self,
        name: &str,
        previous: Option<Arc<CacheEntry>>,
        fetched: Option<String>,
    ) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now();
        let entry = match (fetched, previous) {
            (Some(template), _) => CacheEntry {
                template,
                origin: PromptOrigin::Remote,
                refreshed_at: now,
                checked_at: now,
            },
            (None, Some(previous)) => CacheEntry {
                checked_at: now,
                ..(*previous).clone()
            },
            (None, None) => CacheEntry {
                template: self.fallback.get(name)?.to_string(),
                origin: PromptOrigin::Fallback,
                refreshed_at: now,
                checked_at: now,
            },
        };
        let entry = Arc::new(entry);
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), entry.clone());
        Some(entry)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.config.fetch_timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.config.fetch_timeout)))
    }
}

/// Served when no layer knows `name`.
pub fn not_found_literal(name: &str) -> String {
    format!("Prompt '{name}' is not available.")
}

fn preview(template: &str) -> String {
    let mut chars = template.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
