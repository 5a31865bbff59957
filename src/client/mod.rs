//! GitLab REST API client.
//!
//! The aggregator only needs authenticated GET requests returning JSON, so
//! the client is exposed through the small [`ApiClient`] trait. The
//! production implementation wraps `reqwest` and gates outbound requests
//! through a semaphore so the fan-out cannot exhaust connections.

pub mod endpoints;
pub mod error;
pub mod pager;

pub use endpoints::Endpoints;
pub use error::ClientError;
pub use pager::walk_pages;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Header GitLab reads personal access tokens from (`PRIVATE-TOKEN`).
pub const TOKEN_HEADER: &str = "private-token";

/// A single-attempt, authenticated GET-JSON capability.
///
/// Implementations must not retry: callers rely on one attempt per query.
pub trait ApiClient: Send + Sync {
    /// Fetch `url` and parse the body as JSON.
    fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, ClientError>> + Send;
}

/// Settings for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub token: String,
    pub timeout_seconds: u64,
    /// Maximum number of requests in flight.
    pub concurrency: usize,
}

/// `reqwest`-backed client for a GitLab instance.
pub struct GitLabClient {
    http: reqwest::Client,
    gate: Arc<Semaphore>,
    timeout_seconds: u64,
}

impl GitLabClient {
    /// Build a client that sends the token on every request.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut token = HeaderValue::from_str(&config.token)
            .context("GitLab token contains characters not allowed in an HTTP header")?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(TOKEN_HEADER), token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("gitlab-activity/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let permits = config.concurrency.max(1);
        info!(
            "HTTP client ready (timeout {}s, {} concurrent requests)",
            config.timeout_seconds, permits
        );

        Ok(Self {
            http,
            gate: Arc::new(Semaphore::new(permits)),
            timeout_seconds: config.timeout_seconds,
        })
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout {
                url: url.to_string(),
                seconds: self.timeout_seconds,
            }
        } else if e.is_decode() {
            ClientError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            ClientError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

impl ApiClient for GitLabClient {
    async fn get_json(&self, url: &str) -> Result<Value, ClientError> {
        // Held until the body has been read.
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ClientError::Transport {
                url: url.to_string(),
                message: "request gate closed".to_string(),
            })?;

        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// In-memory client for tests.
#[cfg(test)]
pub mod testing {
    use super::{ApiClient, ClientError};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned JSON per exact URL; unknown URLs answer 404.
    #[derive(Default)]
    pub struct FakeClient {
        responses: HashMap<String, Value>,
        delays: HashMap<String, Duration>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, url: &str, body: Value) -> Self {
            self.responses.insert(url.to_string(), body);
            self
        }

        /// Delay the answer for `url`, to shuffle completion order.
        pub fn with_delay(mut self, url: &str, millis: u64) -> Self {
            self.delays
                .insert(url.to_string(), Duration::from_millis(millis));
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    impl ApiClient for FakeClient {
        async fn get_json(&self, url: &str) -> Result<Value, ClientError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(url.to_string());
            }
            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| ClientError::Status {
                    url: url.to_string(),
                    status: 404,
                    body: r#"{"message":"404 Not Found"}"#.to_string(),
                })
        }
    }
}
