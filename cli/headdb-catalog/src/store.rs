//! The installed catalog and lookups against it.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use regex::Regex;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::parse::IdSequence;
use crate::types::{Category, Entry};

/// Colour and formatting codes (`§a`, `§l`, ...) used in entry names.
static FORMATTING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)§[0-9A-FK-ORX]").expect("formatting code regex is valid"));

/// Remove formatting codes from `text`.
pub fn strip_formatting(text: &str) -> String {
    FORMATTING_CODE.replace_all(text, "").into_owned()
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The entries produced by one refresh cycle, grouped by category.
///
/// Categories iterate in the order they were refreshed in.
/// A category that failed to refresh is present without entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    categories: IndexMap<Category, Arc<[Entry]>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.keys()
    }

    /// Every entry, in category order then entry order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.categories.values().flat_map(|entries| entries.iter())
    }

    /// The entries of `category`, empty for unknown categories.
    pub fn entries_in(&self, category: &Category) -> Arc<[Entry]> {
        self.categories
            .get(category)
            .cloned()
            .unwrap_or_else(|| Arc::from([]))
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(|entries| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn by_id(&self, id: u64) -> Option<&Entry> {
        self.entries().find(|entry| entry.id() == id)
    }

    pub fn by_unique_id(&self, uuid: Uuid) -> Option<&Entry> {
        self.entries().find(|entry| entry.uuid() == uuid)
    }

    pub fn by_value(&self, value: &str) -> Option<&Entry> {
        self.entries().find(|entry| entry.value() == value)
    }

    /// Entries with a tag containing `tag`, ignoring case.
    pub fn by_tag(&self, tag: &str) -> Vec<&Entry> {
        let tag = tag.to_lowercase();
        self.entries()
            .filter(|entry| {
                entry
                    .tags()
                    .iter()
                    .any(|candidate| candidate.to_lowercase().contains(&tag))
            })
            .collect()
    }

    /// Entries whose name contains `name`, ignoring case and formatting codes.
    ///
    /// Searches every category if `category` is [None].
    pub fn by_name(&self, category: Option<&Category>, name: &str) -> Vec<&Entry> {
        let needle = strip_formatting(&name.to_lowercase());
        let matches =
            |entry: &&Entry| strip_formatting(&entry.name().to_lowercase()).contains(&needle);

        match category {
            Some(category) => self
                .categories
                .get(category)
                .into_iter()
                .flat_map(|entries| entries.iter())
                .filter(matches)
                .collect(),
            None => self.entries().filter(matches).collect(),
        }
    }
}

impl<E: Into<Arc<[Entry]>>> FromIterator<(Category, E)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (Category, E)>>(iter: I) -> Self {
        Snapshot {
            categories: iter
                .into_iter()
                .map(|(category, entries)| (category, entries.into()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Installed {
    snapshot: Arc<Snapshot>,
    updated_at: Option<Instant>,
}

/// Holds the installed [Snapshot].
///
/// Installing a snapshot swaps it in atomically,
/// readers see either the previous or the new snapshot, never a mix.
/// Lookups never wait for a refresh.
#[derive(Debug)]
pub struct CatalogStore {
    installed: ArcSwap<Installed>,
    ids: IdSequence,
    refresh_interval: Duration,
    fetch_timeout: Duration,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new(&CatalogConfig::default())
    }
}

impl CatalogStore {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            installed: ArcSwap::from_pointee(Installed::default()),
            ids: IdSequence::new(),
            refresh_interval: config.refresh_interval(),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Id source for entries installed in this store.
    pub fn ids(&self) -> &IdSequence {
        &self.ids
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Replace the installed snapshot and reset the staleness clock.
    pub fn install(&self, snapshot: Arc<Snapshot>) {
        debug!(
            categories = snapshot.categories.len(),
            entries = snapshot.len(),
            "installing catalog snapshot"
        );
        self.installed.store(Arc::new(Installed {
            snapshot,
            updated_at: Some(Instant::now()),
        }));
    }

    /// The currently installed snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.installed.load().snapshot)
    }

    /// Time since the last install, [None] if nothing was installed yet.
    pub fn since_update(&self) -> Option<Duration> {
        self.installed
            .load()
            .updated_at
            .map(|updated_at| updated_at.elapsed())
    }

    /// Whether the installed snapshot is older than the refresh interval.
    ///
    /// A store that was never refreshed is stale.
    pub fn is_stale(&self) -> bool {
        match self.since_update() {
            Some(elapsed) => elapsed >= self.refresh_interval,
            None => true,
        }
    }

    pub fn by_id(&self, id: u64) -> Option<Entry> {
        self.snapshot().by_id(id).cloned()
    }

    pub fn by_unique_id(&self, uuid: Uuid) -> Option<Entry> {
        self.snapshot().by_unique_id(uuid).cloned()
    }

    pub fn by_value(&self, value: &str) -> Option<Entry> {
        self.snapshot().by_value(value).cloned()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<Entry> {
        self.snapshot().by_tag(tag).into_iter().cloned().collect()
    }

    pub fn by_name(&self, category: Option<&Category>, name: &str) -> Vec<Entry> {
        self.snapshot()
            .by_name(category, name)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every installed entry.
    pub fn all(&self) -> Vec<Entry> {
        self.snapshot().entries().cloned().collect()
    }

    /// The installed entries of `category`.
    pub fn all_in(&self, category: &Category) -> Arc<[Entry]> {
        self.snapshot().entries_in(category)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
