//! Async HTTP fetch capability wrapping reqwest.
//!
//! Bounded GET requests only, no rendering. Non-2xx statuses are surfaced
//! as a response with `ok() == false`, never as an error; only transport
//! problems (DNS, connect, timeout, body read) become [`TransportError`].

use async_trait::async_trait;
use std::error::Error as _;
use std::time::Duration;

/// Response from a GET request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Requested URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text (may be empty on error statuses).
    pub body: String,
}

impl FetchResponse {
    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level fetch failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("DNS resolution failed for {host}")]
    Dns { host: String },

    #[error("request to {host} timed out")]
    Timeout { host: String },

    #[error("connection to {host} failed: {message}")]
    Connect { host: String, message: String },

    #[error("failed to read response body from {host}: {message}")]
    Body { host: String, message: String },

    #[error("request to {host} failed: {message}")]
    Other { host: String, message: String },
}

impl TransportError {
    /// Whether this failure was a name-resolution failure.
    pub fn is_dns(&self) -> bool {
        matches!(self, Self::Dns { .. })
    }

    /// Host the failed request was addressed to.
    pub fn host(&self) -> &str {
        match self {
            Self::Dns { host }
            | Self::Timeout { host }
            | Self::Connect { host, .. }
            | Self::Body { host, .. }
            | Self::Other { host, .. } => host,
        }
    }
}

/// Injected fetch capability. Implementations must bound every request by a
/// timeout and must not fail on non-2xx statuses.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, TransportError>;
}

/// HTTP client for page and API acquisition.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with a desktop Chrome user-agent.
    pub fn new(timeout_ms: u64, accept_language: &str) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = reqwest::header::HeaderValue::from_str(accept_language) {
            headers.insert(reqwest::header::ACCEPT_LANGUAGE, value);
        }

        let timeout = Duration::from_millis(timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .default_headers(headers)
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }

    /// Configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Fetch for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, TransportError> {
        let host = host_of(url);

        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify(e, &host))?;

        let status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(body) => body,
            // An error status with an unreadable body still carries its status.
            Err(_) if !(200..300).contains(&status) => String::new(),
            Err(e) => {
                return Err(TransportError::Body {
                    host,
                    message: e.without_url().to_string(),
                })
            }
        };

        Ok(FetchResponse {
            url: url.to_string(),
            status,
            body,
        })
    }
}

/// Fetch with an outer deadline, for callers that cannot trust the
/// implementation to bound itself.
pub async fn fetch_with_timeout(
    fetcher: &dyn Fetch,
    url: &str,
    timeout: Duration,
) -> Result<FetchResponse, TransportError> {
    match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout { host: host_of(url) }),
    }
}

/// Host component of a URL, or the raw string when it does not parse.
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| url.to_string())
}

/// Map a reqwest error onto the transport taxonomy. The URL is stripped
/// first: it can carry credentials in its path or query.
fn classify(err: reqwest::Error, host: &str) -> TransportError {
    let host = host.to_string();
    let err = err.without_url();
    if err.is_timeout() {
        return TransportError::Timeout { host };
    }

    // reqwest does not expose resolver failures directly; walk the source chain.
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        chain.push_str(": ");
        chain.push_str(&s.to_string());
        source = s.source();
    }
    let lower = chain.to_ascii_lowercase();
    if lower.contains("dns")
        || lower.contains("failed to lookup address")
        || lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
    {
        return TransportError::Dns { host };
    }

    if err.is_connect() {
        TransportError::Connect {
            host,
            message: chain,
        }
    } else {
        TransportError::Other {
            host,
            message: chain,
        }
    }
}
