//! Notification of refresh outcomes.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::error::{CategoryRefreshFailure, RefreshError};
use crate::refresh::RefreshReport;
use crate::types::Category;

/// Receives the outcome of a refresh cycle.
///
/// Listeners are called from the refresh task once the cycle ends,
/// whether or not the caller still awaits its [crate::RefreshHandle].
/// Every method defaults to doing nothing.
pub trait RefreshListener: Send + Sync + 'static {
    /// A category could not be fetched from any provider.
    fn category_failed(&self, _failure: &CategoryRefreshFailure) {}

    /// A snapshot was installed.
    fn refreshed(&self, _report: &Arc<RefreshReport>) {}

    /// The cycle ended without installing a snapshot.
    fn refresh_failed(&self, _error: &RefreshError) {}
}

impl RefreshListener for () {}

/// Events sent by the channel implementation of [RefreshListener].
#[derive(Debug, Clone)]
pub enum RefreshEvent {
    CategoryFailed { category: Category, reason: String },
    Refreshed(Arc<RefreshReport>),
    Failed(RefreshError),
}

// A closed receiver only means nobody is interested anymore.
impl RefreshListener for UnboundedSender<RefreshEvent> {
    fn category_failed(&self, failure: &CategoryRefreshFailure) {
        let _ = self.send(RefreshEvent::CategoryFailed {
            category: failure.category.clone(),
            reason: failure.to_string(),
        });
    }

    fn refreshed(&self, report: &Arc<RefreshReport>) {
        let _ = self.send(RefreshEvent::Refreshed(Arc::clone(report)));
    }

    fn refresh_failed(&self, error: &RefreshError) {
        let _ = self.send(RefreshEvent::Failed(error.clone()));
    }
}

impl<L: RefreshListener> RefreshListener for Arc<L> {
    fn category_failed(&self, failure: &CategoryRefreshFailure) {
        (**self).category_failed(failure)
    }

    fn refreshed(&self, report: &Arc<RefreshReport>) {
        (**self).refreshed(report)
    }

    fn refresh_failed(&self, error: &RefreshError) {
        (**self).refresh_failed(error)
    }
}
