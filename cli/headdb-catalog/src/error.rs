//! Error handling for catalog fetches and refresh cycles.

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use crate::types::Category;

/// A single request to a provider failed.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("invalid provider url '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status { url: String, status: StatusCode },
    #[error("could not read response from {url}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A provider response could not be turned into entries.
#[derive(Debug, Error)]
pub enum MalformedDataError {
    #[error("response is not valid JSON")]
    Json(#[source] serde_json::Error),
    #[error("expected a JSON array, found {found}")]
    NotAnArray { found: &'static str },
    #[error("element {index} is not a JSON object")]
    NotAnObject { index: usize },
    #[error("element {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
}

/// Failure of one provider attempt for one category.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    MalformedData(#[from] MalformedDataError),
}

/// Every attempt to refresh a category failed.
///
/// `fallback` is [None] if the fallback provider is disabled.
#[derive(Debug, Error)]
#[error("failed to refresh category '{category}': {}{}", fmt_provider_error(.primary), fmt_fallback(.fallback))]
pub struct CategoryRefreshFailure {
    pub category: Category,
    pub primary: ProviderError,
    pub fallback: Option<ProviderError>,
}

/// A refresh cycle produced nothing that could be installed.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("refresh was cancelled")]
    Cancelled,
    #[error("all {} categories failed to refresh", .failures.len())]
    AllCategoriesFailed {
        failures: Arc<[CategoryRefreshFailure]>,
    },
    #[error("refresh task failed: {0}")]
    TaskFailed(String),
}

/// Formats an error with its chain of sources,
/// `reqwest` hides most of the useful information in them.
pub(crate) fn fmt_provider_error(error: &ProviderError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn fmt_fallback(fallback: &Option<ProviderError>) -> String {
    match fallback {
        Some(error) => format!(" (fallback: {})", fmt_provider_error(error)),
        None => String::new(),
    }
}
