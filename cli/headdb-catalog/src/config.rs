//! Configuration consumed by the catalog.
//!
//! The catalog does not load configuration itself,
//! hosts deserialize a [CatalogConfig] from their own sources.

use std::time::Duration;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::types::Category;

pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 3600;
pub const DEFAULT_FETCH_TIMEOUT_MILLIS: u64 = 5000;
pub const DEFAULT_PRIMARY_URL: &str = "https://minecraft-heads.com/scripts/api.php";
pub const DEFAULT_FALLBACK_URL: &str = "https://heads.pages.dev/archive";
pub const DEFAULT_USER_AGENT: &str = "HeadDB-DatabaseUpdater";
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Seconds after which the installed snapshot is considered stale
    pub refresh_interval_seconds: u64,
    /// Timeout of a single provider request
    pub fetch_timeout_millis: u64,
    /// Whether to try the fallback provider when the primary fails
    pub fallback_enabled: bool,
    /// Base URL of the primary provider.
    // Using a URL here adds an extra trailing slash,
    // so just use a String.
    pub primary_url: String,
    /// Base URL of the fallback provider
    pub fallback_url: String,
    /// `User-Agent` sent with every request
    pub user_agent: String,
    /// How many categories are fetched at the same time
    pub max_concurrent_fetches: usize,
    /// Categories to fetch instead of [Category::all]
    pub categories: Option<Vec<Category>>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECONDS,
            fetch_timeout_millis: DEFAULT_FETCH_TIMEOUT_MILLIS,
            fallback_enabled: true,
            primary_url: DEFAULT_PRIMARY_URL.to_string(),
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            categories: None,
        }
    }
}

impl CatalogConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_millis)
    }

    /// The categories a refresh cycle covers.
    ///
    /// Repeated categories are listed once, at their first position.
    pub fn categories(&self) -> Vec<Category> {
        match &self.categories {
            Some(categories) => categories
                .iter()
                .cloned()
                .collect::<IndexSet<_>>()
                .into_iter()
                .collect(),
            None => Category::all().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config: CatalogConfig =
            serde_json::from_str(r#"{ "refresh_interval_seconds": 10 }"#).unwrap();

        assert_eq!(config, CatalogConfig {
            refresh_interval_seconds: 10,
            ..Default::default()
        });
        assert_eq!(config.refresh_interval(), Duration::from_secs(10));
        assert_eq!(config.fetch_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn categories_can_be_overridden() {
        let config: CatalogConfig =
            serde_json::from_str(r#"{ "categories": ["blocks", "vehicles"] }"#).unwrap();

        assert_eq!(config.categories(), [
            Category::BLOCKS,
            Category::new("vehicles")
        ]);
        assert_eq!(CatalogConfig::default().categories(), Category::all());
    }

    #[test]
    fn repeated_categories_are_listed_once() {
        let config: CatalogConfig =
            serde_json::from_str(r#"{ "categories": ["blocks", "plants", "blocks"] }"#).unwrap();

        assert_eq!(config.categories(), [Category::BLOCKS, Category::PLANTS]);
    }
}
