//! Named prompt resolution with a remote store, a fallback catalog, and
//! time-based cache invalidation.
//!
//! The entry point is [`PromptCache`]. It is constructed once with an injected
//! [`PromptStore`], [`CacheConfig`], and optionally a custom
//! [`FallbackCatalog`] or [`Clock`], then shared by every caller that needs a
//! prompt for the language model.
//!
//! ```text
//! resolve(name, vars)
//!   ├─ entry fresh? ── yes ──────────────────────────────┐
//!   └─ no ─▶ PromptStore::fetch (bounded by timeout)      │
//!             ├─ found ─▶ replace entry ──────────────────┤
//!             └─ absent / unreachable ─▶ keep old entry, ─┤
//!                                  or cache the fallback  │
//!                                                         ▼
//!            cached entry ─▶ fallback catalog ─▶ not-found literal
//!                                                         │
//!                                             render(template, vars)
//! ```
//!
//! # Where to find things
//!
//! - **Resolving prompts and the admin surface:** [`cache`]:
//!   [`PromptCache::resolve`], [`PromptCache::force_reload`],
//!   [`PromptCache::snapshot`].
//! - **Placeholder rules:** [`render`]: flat `{identifier}` substitution with
//!   an all-or-nothing missing-variable policy.
//! - **Default prompts:** [`fallback`].
//! - **Backends:** [`store`]: Google Cloud Storage, a local directory, and an
//!   in-memory store for tests. Objects live at `prompts/<name>.txt`.

pub mod cache;
pub mod clock;
pub mod fallback;
pub mod render;
pub mod store;

pub use cache::{
    CacheConfig, CacheEntry, CacheSnapshot, PromptCache, PromptOrigin, RefreshOutcome,
    ReloadReport, Resolution, SnapshotEntry, not_found_literal,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::{FallbackCatalog, REQUIRED_PROMPTS};
pub use render::{MissingVariables, Variables, placeholders, render, try_render, vars};
pub use store::{
    DirPromptStore, GcsPromptStore, MemoryPromptStore, PromptStore, StoreError, TokenSource,
    prompt_path,
};
