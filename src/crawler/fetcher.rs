//! HTTP fetcher
//!
//! The fetcher is the only place the crawler talks HTTP. It turns a task into
//! a [`FetchResult`] or a classified [`FetchError`]; deciding what a failure
//! means for the task is left to the retry policy.

use crate::config::UserAgentConfig;
use crate::task::ProcessingTask;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// A successfully fetched document
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects
    pub url: Url,

    /// HTTP status code
    pub status: u16,

    pub headers: HeaderMap,

    pub body: String,

    /// Media type without parameters, lowercased (e.g. `text/html`)
    pub media_type: Option<String>,
}

impl FetchResult {
    /// Checks if the document is HTML
    pub fn is_html(&self) -> bool {
        matches!(
            self.media_type.as_deref(),
            Some("text/html") | Some("application/xhtml+xml")
        )
    }
}

/// Classified fetch failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Status {
        url: String,
        status: u16,
        /// Seconds from a `Retry-After` header, if present
        retry_after: Option<u64>,
    },

    #[error("Too many redirects from {url}")]
    Redirect { url: String },

    #[error("Failed to read body of {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} is disallowed by robots.txt")]
    RobotsDenied { url: String },
}

impl FetchError {
    /// Classifies a reqwest error
    pub fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            FetchError::Timeout { url }
        } else if error.is_connect() {
            FetchError::Connect {
                url,
                reason: error.to_string(),
            }
        } else if error.is_redirect() {
            FetchError::Redirect { url }
        } else if error.is_body() || error.is_decode() {
            FetchError::Body {
                url,
                reason: error.to_string(),
            }
        } else {
            FetchError::Request {
                url,
                reason: error.to_string(),
            }
        }
    }
}

/// Fetches the document a task points at
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, task: &ProcessingTask) -> Result<FetchResult, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_tide::config::UserAgentConfig;
/// use sumi_tide::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, task: &ProcessingTask) -> Result<FetchResult, FetchError> {
        let url = task.url();
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after,
            });
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let media_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(media_type_of);

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(FetchResult {
            url: final_url,
            status: status.as_u16(),
            headers,
            body,
            media_type,
        })
    }
}

/// Extracts the bare media type from a Content-Type value
fn media_type_of(content_type: &str) -> Option<String> {
    let media_type = content_type.split(';').next()?.trim().to_lowercase();
    (!media_type.is_empty()).then_some(media_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task(url: &str) -> ProcessingTask {
        ProcessingTask::seed(Url::parse(url).unwrap(), "test", 0, Utc::now())
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(build_http_client(&UserAgentConfig::default()).unwrap())
    }

    #[test]
    fn test_media_type_of() {
        assert_eq!(
            media_type_of("text/HTML; charset=utf-8"),
            Some("text/html".to_string())
        );
        assert_eq!(media_type_of(""), None);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><title>Hi</title></html>", "text/html"),
            )
            .mount(&server)
            .await;

        let result = fetcher()
            .fetch(&task(&format!("{}/page", server.uri())))
            .await
            .unwrap();

        assert_eq!(result.status, 200);
        assert!(result.is_html());
        assert!(result.body.contains("Hi"));
    }

    #[tokio::test]
    async fn test_fetch_status_error_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
            .mount(&server)
            .await;

        let url = format!("{}/busy", server.uri());
        let error = fetcher().fetch(&task(&url)).await.unwrap_err();

        assert_eq!(
            error,
            FetchError::Status {
                url,
                status: 429,
                retry_after: Some(120),
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Port 9 (discard) is closed on test machines
        let error = fetcher()
            .fetch(&task("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            FetchError::Connect { .. } | FetchError::Request { .. }
        ));
    }
}
