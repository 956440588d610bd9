//! Outbound REST plumbing shared by every capability module.
//!
//! Every call gets a per-attempt timeout and bounded retries with exponential
//! backoff. Client errors (4xx) are returned immediately except 429.
//! Reference data can be served from the process-wide [`ResponseCache`].

use std::sync::Arc;
use std::time::Duration;

use mission_control_core::config::HttpConfig;
use mission_control_core::ExpiringMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub type ResponseCache = ExpiringMap<String, Value>;

const ERROR_BODY_LIMIT: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Delay after the zero-based `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1_u32 << attempt.min(16))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
    /// Backend-level failure reported inside a successful HTTP response.
    #[error("{0}")]
    Api(String),
    /// Input rejected locally; no request was sent.
    #[error("{0}")]
    Invalid(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Decode(_) | Self::Config(_) | Self::Api(_) | Self::Invalid(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct CacheSpec {
    key: String,
    ttl: Duration,
}

/// One logical call; retried as a unit.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    cache: Option<CacheSpec>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None, cache: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).json(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).json(body)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Serve from and populate the shared cache under `key`.
    pub fn cached(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some(CacheSpec { key: key.into(), ttl });
        self
    }
}

#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    policy: RetryPolicy,
    cache: Arc<ResponseCache>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RestClient {
    pub fn new(
        base_url: &str,
        policy: RetryPolicy,
        cache: Arc<ResponseCache>,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mission-control/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| FetchError::Config(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: HeaderMap::new(),
            policy,
            cache,
        })
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, FetchError> {
        let mut value = HeaderValue::from_str(value)
            .map_err(|_| FetchError::Config(format!("invalid value for header `{name}`")))?;
        value.set_sensitive(true);
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn with_bearer(mut self, token: &SecretString) -> Result<Self, FetchError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| FetchError::Config("invalid bearer token".to_string()))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub async fn send(&self, request: ApiRequest) -> Result<Value, FetchError> {
        if let Some(spec) = &request.cache {
            if let Some(hit) = self.cache.get(&spec.key) {
                debug!(event_name = "integrations.fetch.cache_hit", key = %spec.key, "cache hit");
                return Ok(hit);
            }
        }

        let url = format!("{}{}", self.base_url, request.path);
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            match self.attempt(&url, &request).await {
                Ok(value) => {
                    if let Some(spec) = &request.cache {
                        self.cache.insert_with_ttl(spec.key.clone(), value.clone(), spec.ttl);
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    warn!(
                        event_name = "integrations.fetch.retry",
                        method = %request.method,
                        path = %request.path,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        error = %error,
                        "outbound request failed"
                    );
                    last_error = Some(error);
                    if attempt + 1 < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Transport("no attempts were made".into())))
    }

    async fn attempt(&self, url: &str, request: &ApiRequest) -> Result<Value, FetchError> {
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(self.headers.clone())
            .timeout(self.policy.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate(response.text().await.unwrap_or_default());
            return Err(FetchError::Status { status: status.as_u16(), body });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let bytes = response.bytes().await.map_err(|error| {
            if error.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Transport(error.to_string())
            }
        })?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|error| FetchError::Decode(error.to_string()))
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > ERROR_BODY_LIMIT {
        let cut = (0..=ERROR_BODY_LIMIT).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        body.truncate(cut);
    }
    body
}
