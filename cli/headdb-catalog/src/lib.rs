//! In-memory catalog of Minecraft heads.
//!
//! This crate provides:
//! - Fetching head categories from a primary provider,
//!   falling back to a secondary provider per category
//! - An atomically replaced snapshot with lookups by id, uuid, value, tag and name
//! - Background refresh with single-flight coalescing, cancellation and staleness tracking
//! - Test doubles for the HTTP layer (feature-gated)
//!
//! ## Usage
//!
//! ```ignore
//! use headdb_catalog::{CatalogCache, CatalogConfig};
//!
//! let cache = CatalogCache::from_config(&CatalogConfig::default())?;
//! let report = cache.refresh().await?;
//! let steve = cache.store().by_name(None, "steve");
//! ```

mod cache;
mod client;
mod config;
mod error;
mod listener;
mod parse;
mod refresh;
mod store;
mod types;

// Public exports
pub use cache::{CatalogCache, RefreshHandle, RefreshOutcome};
#[cfg(any(test, feature = "tests"))]
pub use client::test_helpers;
pub use client::{Fetch, HttpFetcher};
pub use config::{
    CatalogConfig,
    DEFAULT_FALLBACK_URL,
    DEFAULT_FETCH_TIMEOUT_MILLIS,
    DEFAULT_MAX_CONCURRENT_FETCHES,
    DEFAULT_PRIMARY_URL,
    DEFAULT_REFRESH_INTERVAL_SECONDS,
    DEFAULT_USER_AGENT,
};
pub use error::{
    CategoryRefreshFailure,
    MalformedDataError,
    NetworkError,
    ProviderError,
    RefreshError,
};
pub use listener::{RefreshEvent, RefreshListener};
pub use parse::{EntryRecord, IdSequence, decode, parse};
pub use refresh::{RefreshCoordinator, RefreshReport};
pub use store::{CatalogStore, Snapshot, strip_formatting};
pub use tokio_util::sync::CancellationToken;
pub use types::{Category, Entry, NO_TAGS_PLACEHOLDER, Tags, UniqueId};
