//! The catalog handle owned by the host.
//!
//! [CatalogCache] ties the [CatalogStore] and the [RefreshCoordinator]
//! together and runs refresh cycles as background tasks.
//! At most one cycle is in flight,
//! refresh requests made while a cycle runs join that cycle
//! and receive its outcome.

use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Fetch, HttpFetcher};
use crate::config::CatalogConfig;
use crate::error::{CategoryRefreshFailure, NetworkError, RefreshError};
use crate::listener::RefreshListener;
use crate::refresh::{RefreshCoordinator, RefreshReport};
use crate::store::CatalogStore;

/// The outcome of a refresh cycle, shared by everyone awaiting it.
pub type RefreshOutcome = Result<Arc<RefreshReport>, RefreshError>;

type SharedOutcome = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Resolves to the outcome of a refresh cycle.
///
/// Dropping the handle does not cancel the cycle.
#[derive(Clone)]
pub struct RefreshHandle(SharedOutcome);

impl Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RefreshHandle").finish_non_exhaustive()
    }
}

impl Future for RefreshHandle {
    type Output = RefreshOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll_unpin(cx)
    }
}

struct InFlight {
    outcome: SharedOutcome,
    listeners: Vec<Box<dyn RefreshListener>>,
    cancel: CancellationToken,
}

struct Inner<F> {
    store: CatalogStore,
    coordinator: RefreshCoordinator<F>,
    in_flight: Mutex<Option<InFlight>>,
    shutdown: CancellationToken,
}

/// A refreshable catalog of heads.
///
/// Lookups go through [CatalogCache::store] and never wait for a refresh.
/// Refreshes run on spawned tokio tasks,
/// the `refresh*` methods and [CatalogCache::spawn_auto_refresh]
/// panic when called outside of a tokio runtime.
pub struct CatalogCache<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for CatalogCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> Debug for CatalogCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("store", &self.inner.store)
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

impl CatalogCache<HttpFetcher> {
    /// Create a cache fetching from the configured providers over HTTP.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, NetworkError> {
        Ok(Self::new(HttpFetcher::new(config)?, config))
    }
}

impl<F: Fetch> CatalogCache<F> {
    /// Create an empty cache, nothing is fetched until the first refresh.
    pub fn new(fetcher: F, config: &CatalogConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: CatalogStore::new(config),
                coordinator: RefreshCoordinator::new(fetcher, config),
                in_flight: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.inner.store
    }

    pub fn fetcher(&self) -> &F {
        self.inner.coordinator.fetcher()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_in_flight().is_some()
    }

    /// Start a refresh cycle, or join the one in flight.
    ///
    /// Must be called within a tokio runtime.
    pub fn refresh(&self) -> RefreshHandle {
        self.refresh_with(())
    }

    /// Like [CatalogCache::refresh], notifying `listener` when the cycle ends.
    pub fn refresh_with(&self, listener: impl RefreshListener) -> RefreshHandle {
        self.start(Box::new(listener), None)
    }

    /// Like [CatalogCache::refresh_with],
    /// cancelling the cycle when `token` is cancelled.
    ///
    /// When joining a cycle in flight,
    /// cancelling `token` cancels it for every requester.
    pub fn refresh_with_token(
        &self,
        listener: impl RefreshListener,
        token: CancellationToken,
    ) -> RefreshHandle {
        self.start(Box::new(listener), Some(token))
    }

    /// Refresh if the installed snapshot is stale.
    pub fn refresh_if_stale(&self) -> Option<RefreshHandle> {
        self.inner.store.is_stale().then(|| self.refresh())
    }

    /// Cancel the cycle in flight, returns whether there was one.
    pub fn cancel_refresh(&self) -> bool {
        match &*self.inner.lock_in_flight() {
            Some(cycle) => {
                cycle.cancel.cancel();
                true
            },
            None => false,
        }
    }

    /// Cancel the cycle in flight and stop auto refresh.
    ///
    /// Later refresh requests are cancelled immediately.
    pub fn shutdown(&self) {
        debug!("shutting down catalog cache");
        self.inner.shutdown.cancel();
    }

    /// Refresh whenever the store is stale, checking every `check_every`,
    /// until the cache is shut down.
    pub fn spawn_auto_refresh(&self, check_every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(check_every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cache.inner.shutdown.cancelled() => break,
                    _ = ticks.tick() => {},
                }
                if let Some(refresh) = cache.refresh_if_stale() {
                    // outcomes are logged when the cycle finishes
                    let _ = refresh.await;
                }
            }
            debug!("auto refresh stopped");
        })
    }

    fn start(
        &self,
        listener: Box<dyn RefreshListener>,
        token: Option<CancellationToken>,
    ) -> RefreshHandle {
        let mut in_flight = self.inner.lock_in_flight();
        if in_flight.is_some() {
            debug!("joining refresh in flight");
        }
        let cycle = in_flight.get_or_insert_with(|| self.spawn_cycle());
        cycle.listeners.push(listener);

        if let Some(token) = token {
            let cancel = cycle.cancel.clone();
            let outcome = cycle.outcome.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => cancel.cancel(),
                    _ = outcome => {},
                }
            });
        }

        RefreshHandle(cycle.outcome.clone())
    }

    /// Spawn a refresh task, must be called with `in_flight` locked.
    fn spawn_cycle(&self) -> InFlight {
        debug!("starting refresh");
        let cancel = self.inner.shutdown.child_token();
        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(inner.run_cycle(task_cancel))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => Err(RefreshError::TaskFailed(panic_message(&*panic))),
            };
            inner.finish_cycle(&outcome);
            outcome
        });

        let outcome = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(RefreshError::TaskFailed(err.to_string())),
            }
        }
        .boxed()
        .shared();

        InFlight {
            outcome,
            listeners: Vec::new(),
            cancel,
        }
    }
}

impl<F: Fetch> Inner<F> {
    async fn run_cycle(&self, cancel: CancellationToken) -> RefreshOutcome {
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RefreshError::Cancelled),
            report = self.coordinator.refresh_all(self.store.ids()) => report,
        };

        if report.all_failed() {
            return Err(RefreshError::AllCategoriesFailed {
                failures: report.failures.into(),
            });
        }

        self.store.install(Arc::clone(&report.snapshot));
        Ok(Arc::new(report))
    }
}

impl<F> Inner<F> {
    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the cycle in flight and notify its listeners.
    fn finish_cycle(&self, outcome: &RefreshOutcome) {
        let listeners = self
            .lock_in_flight()
            .take()
            .map(|cycle| cycle.listeners)
            .unwrap_or_default();

        let failures: &[CategoryRefreshFailure] = match outcome {
            Ok(report) => report.failures.as_slice(),
            Err(RefreshError::AllCategoriesFailed { failures }) => &failures[..],
            Err(_) => &[],
        };

        match outcome {
            Ok(report) => info!(
                entries = report.snapshot.len(),
                failed = failures.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "catalog refreshed"
            ),
            Err(RefreshError::Cancelled) => info!("refresh cancelled"),
            Err(err) => warn!(error = %err, "refresh failed, keeping the previous catalog"),
        }

        for listener in &listeners {
            for failure in failures {
                listener.category_failed(failure);
            }
            match outcome {
                Ok(report) => listener.refreshed(report),
                Err(err) => listener.refresh_failed(err),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "refresh task panicked".to_string()
    }
}
