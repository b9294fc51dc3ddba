//! HTTP access to the catalog providers.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, instrument};
use url::Url;

use crate::config::CatalogConfig;
use crate::error::NetworkError;

/// Performs a single GET against a provider and returns the body.
///
/// Implementations do not retry,
/// falling back to another provider is up to the caller.
///
/// This trait enables alternate implementations:
/// - **HTTP**: [`HttpFetcher`] backed by `reqwest`
/// - **Mock** (tests): canned responses without HTTP
pub trait Fetch: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, NetworkError>> + Send;
}

/// Fetches provider responses over HTTP.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl HttpFetcher {
    pub fn new(config: &CatalogConfig) -> Result<Self, NetworkError> {
        let client = build_http_client(config)?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }
}

impl Fetch for HttpFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<String, NetworkError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| request_error(url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(|source| {
            if source.is_timeout() {
                NetworkError::Timeout {
                    url: url.to_string(),
                }
            } else {
                NetworkError::Body {
                    url: url.to_string(),
                    source,
                }
            }
        })?;

        debug!(%status, bytes = body.len(), "received provider response");
        Ok(body)
    }
}

fn request_error(url: &Url, source: reqwest::Error) -> NetworkError {
    if source.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
    } else {
        NetworkError::Request {
            url: url.to_string(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client builder
// ---------------------------------------------------------------------------

/// Build the HTTP client shared by all provider requests.
fn build_http_client(config: &CatalogConfig) -> Result<reqwest::Client, NetworkError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

    debug!(
        user_agent = %config.user_agent,
        timeout_ms = config.fetch_timeout_millis,
        "building catalog HTTP client"
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(&config.user_agent)
        .connect_timeout(config.fetch_timeout())
        .build()
        .map_err(NetworkError::Client)
}

#[cfg(any(test, feature = "tests"))]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use reqwest::StatusCode;

    use super::*;

    /// A canned response of the [MockFetcher].
    #[derive(Debug, Clone)]
    pub enum MockResponse {
        Body(String),
        Unavailable,
        TimedOut,
    }

    /// A [Fetch] implementation serving canned responses by URL.
    ///
    /// URLs without a response are answered with `404 Not Found`.
    #[derive(Debug, Default)]
    pub struct MockFetcher {
        responses: Mutex<HashMap<String, MockResponse>>,
        requests: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl MockFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every response, useful to keep a refresh in flight.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn respond(self, url: impl Into<String>, response: MockResponse) -> Self {
            self.set_response(url, response);
            self
        }

        /// Replace the response for `url` after construction.
        pub fn set_response(&self, url: impl Into<String>, response: MockResponse) {
            self.responses.lock().unwrap().insert(url.into(), response);
        }

        pub fn respond_body(self, url: impl Into<String>, body: impl Into<String>) -> Self {
            self.respond(url, MockResponse::Body(body.into()))
        }

        /// All URLs requested so far, in request order.
        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Fetch for MockFetcher {
        async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<String, NetworkError> {
            self.requests.lock().unwrap().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let response = self.responses.lock().unwrap().get(url.as_str()).cloned();
            match response {
                Some(MockResponse::Body(body)) => Ok(body),
                Some(MockResponse::Unavailable) => Err(NetworkError::Status {
                    url: url.to_string(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                }),
                Some(MockResponse::TimedOut) => Err(NetworkError::Timeout {
                    url: url.to_string(),
                }),
                None => Err(NetworkError::Status {
                    url: url.to_string(),
                    status: StatusCode::NOT_FOUND,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use reqwest::StatusCode;

    use super::*;

    fn fetcher(user_agent: &str) -> HttpFetcher {
        HttpFetcher::new(&CatalogConfig {
            user_agent: user_agent.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_body_of_successful_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api.php").query_param("cat", "blocks");
                then.status(200).body(r#"[{"name":"Stone","value":"v"}]"#);
            })
            .await;

        let url = Url::parse(&server.url("/api.php?cat=blocks")).unwrap();
        let body = fetcher("test-agent")
            .fetch(&url, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(body, r#"[{"name":"Stone","value":"v"}]"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn user_agent_set_on_requests() {
        let expected_agent = "HeadDB-DatabaseUpdater";

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.header("user-agent", expected_agent);
                then.status(200).body("[]");
            })
            .await;

        let url = Url::parse(&server.url("/archive/blocks.json")).unwrap();
        let _ = fetcher(expected_agent)
            .fetch(&url, Duration::from_secs(5))
            .await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_a_network_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|_, then| {
                then.status(503).body("maintenance");
            })
            .await;

        let url = Url::parse(&server.url("/api.php")).unwrap();
        let result = fetcher("test-agent")
            .fetch(&url, Duration::from_secs(5))
            .await;

        assert!(
            matches!(
                result,
                Err(NetworkError::Status { status, .. }) if status == StatusCode::SERVICE_UNAVAILABLE
            ),
            "expected NetworkError::Status, found: {result:?}"
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|_, then| {
                then.status(200)
                    .body("[]")
                    .delay(Duration::from_millis(500));
            })
            .await;

        let url = Url::parse(&server.url("/api.php")).unwrap();
        let result = fetcher("test-agent")
            .fetch(&url, Duration::from_millis(50))
            .await;

        assert!(
            matches!(result, Err(NetworkError::Timeout { .. })),
            "expected NetworkError::Timeout, found: {result:?}"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Nothing listens on the discard port
        let url = Url::parse("http://127.0.0.1:9/api.php").unwrap();
        let result = fetcher("test-agent")
            .fetch(&url, Duration::from_secs(1))
            .await;

        assert!(
            matches!(
                result,
                Err(NetworkError::Request { .. } | NetworkError::Timeout { .. })
            ),
            "expected a request error, found: {result:?}"
        );
    }
}
