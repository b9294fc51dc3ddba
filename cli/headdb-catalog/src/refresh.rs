//! Refresh cycles: fetch every category from the providers.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use indexmap::IndexMap;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::client::Fetch;
use crate::config::CatalogConfig;
use crate::error::{CategoryRefreshFailure, NetworkError, ProviderError};
use crate::parse::{EntryRecord, IdSequence, decode};
use crate::store::Snapshot;
use crate::types::{Category, Entry};

/// The result of one refresh cycle.
///
/// Categories that failed are part of `snapshot` without entries,
/// the reasons are listed in `failures`.
#[derive(Debug)]
pub struct RefreshReport {
    pub snapshot: Arc<Snapshot>,
    pub failures: Vec<CategoryRefreshFailure>,
    pub elapsed: Duration,
}

impl RefreshReport {
    /// Whether no category could be refreshed.
    pub fn all_failed(&self) -> bool {
        !self.failures.is_empty()
            && self.snapshot.categories().all(|category| {
                self.failures
                    .iter()
                    .any(|failure| &failure.category == category)
            })
    }
}

/// Fetches categories from the primary provider,
/// falling back to the fallback provider per category.
pub struct RefreshCoordinator<F> {
    fetcher: F,
    primary_url: String,
    fallback_url: String,
    fallback_enabled: bool,
    fetch_timeout: Duration,
    max_concurrent_fetches: usize,
    categories: Vec<Category>,
}

impl<F> Debug for RefreshCoordinator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("primary_url", &self.primary_url)
            .field("fallback_url", &self.fallback_url)
            .field("fallback_enabled", &self.fallback_enabled)
            .finish_non_exhaustive()
    }
}

impl<F: Fetch> RefreshCoordinator<F> {
    pub fn new(fetcher: F, config: &CatalogConfig) -> Self {
        Self {
            fetcher,
            primary_url: config.primary_url.clone(),
            fallback_url: config.fallback_url.clone(),
            fallback_enabled: config.fallback_enabled,
            fetch_timeout: config.fetch_timeout(),
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            categories: config.categories(),
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// `<primary>?cat=<category>&tags=true`
    pub fn primary_url(&self, category: &Category) -> Result<Url, NetworkError> {
        let mut url = parse_base_url(&self.primary_url)?;
        url.query_pairs_mut()
            .append_pair("cat", category.name())
            .append_pair("tags", "true");
        Ok(url)
    }

    /// `<fallback>/<category>.json`
    pub fn fallback_url(&self, category: &Category) -> Result<Url, NetworkError> {
        let url = format!(
            "{}/{}.json",
            self.fallback_url.trim_end_matches('/'),
            category.name()
        );
        parse_base_url(&url)
    }

    /// Run a refresh cycle over all configured categories.
    ///
    /// Categories are fetched concurrently
    /// but ids are assigned in category order once all fetches are done.
    /// Failing categories never abort the cycle.
    #[instrument(skip_all, fields(categories = self.categories.len()))]
    pub async fn refresh_all(&self, ids: &IdSequence) -> RefreshReport {
        let started = Instant::now();
        debug!(
            fallback_enabled = self.fallback_enabled,
            "updating catalog"
        );

        let outcomes = stream::iter(self.categories.iter().cloned())
            .map(|category| async move {
                let outcome = self.refresh_category(&category).await;
                (category, outcome)
            })
            .buffered(self.max_concurrent_fetches)
            .collect::<Vec<_>>()
            .await;

        let mut categories = IndexMap::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (category, outcome) in outcomes {
            let entries = match outcome {
                Ok(records) => records
                    .into_iter()
                    .map(|record| record.into_entry(ids.next_id(), category.clone()))
                    .collect::<Vec<Entry>>(),
                Err(failure) => {
                    failures.push(failure);
                    Vec::new()
                },
            };
            categories.insert(category, entries);
        }

        let report = RefreshReport {
            snapshot: Arc::new(Snapshot::from_iter(categories)),
            failures,
            elapsed: started.elapsed(),
        };
        debug!(
            entries = report.snapshot.len(),
            failed = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "catalog update finished"
        );
        report
    }

    /// Fetch one category, trying the fallback provider if the primary fails.
    pub async fn refresh_category(
        &self,
        category: &Category,
    ) -> Result<Vec<EntryRecord>, CategoryRefreshFailure> {
        debug!(%category, "caching entries");
        let started = Instant::now();

        let primary = match self.primary_url(category) {
            Ok(url) => self.gather(&url).await,
            Err(err) => Err(err.into()),
        };
        let primary_error = match primary {
            Ok(records) => {
                debug!(
                    %category,
                    entries = records.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "done"
                );
                return Ok(records);
            },
            Err(err) => err,
        };

        warn!(%category, error = %primary_error, "failed to fetch entries from primary provider");
        if !self.fallback_enabled {
            error!(%category, "failed to fetch entries and the fallback provider is disabled");
            return Err(CategoryRefreshFailure {
                category: category.clone(),
                primary: primary_error,
                fallback: None,
            });
        }

        info!(%category, "attempting fallback provider");
        let fallback = match self.fallback_url(category) {
            Ok(url) => self.gather(&url).await,
            Err(err) => Err(err.into()),
        };
        match fallback {
            Ok(records) => {
                debug!(
                    %category,
                    entries = records.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "done using fallback provider"
                );
                Ok(records)
            },
            Err(fallback_error) => {
                error!(%category, error = %fallback_error, "failed to fetch entries from both providers");
                Err(CategoryRefreshFailure {
                    category: category.clone(),
                    primary: primary_error,
                    fallback: Some(fallback_error),
                })
            },
        }
    }

    async fn gather(&self, url: &Url) -> Result<Vec<EntryRecord>, ProviderError> {
        let text = self.fetcher.fetch(url, self.fetch_timeout).await?;
        Ok(decode(&text)?)
    }
}

fn parse_base_url(url: &str) -> Result<Url, NetworkError> {
    Url::parse(url).map_err(|source| NetworkError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}
