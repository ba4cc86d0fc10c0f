//! Redirect resolution against the configured image endpoint.
//!
//! The endpoint answers every GET with a redirect to a concrete image. The resolver
//! disables redirect following so it can read the `Location` header of that first
//! response instead of downloading the image itself.

use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::retry::{RetryPolicy, retry_with_policy};
use reqwest::StatusCode;
use reqwest::header::LOCATION;

/// Status codes whose `Location` header carries the resolved URL
const REDIRECT_STATUSES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// Abstraction over redirect resolution, enabling testability.
#[async_trait::async_trait]
pub trait UrlResolver: Send + Sync {
    /// Resolve one image URL, retrying transient failures internally
    async fn resolve(&self) -> std::result::Result<String, ResolveError>;
}

/// Production [`UrlResolver`] that follows a single redirect hop over HTTP.
pub struct RedirectResolver {
    client: reqwest::Client,
    endpoint: String,
    policy: RetryPolicy,
}

impl RedirectResolver {
    /// Build a resolver from configuration
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            policy: RetryPolicy::exponential(config.max_retries, config.base_delay)
                .with_jitter(config.jitter),
        })
    }

    /// The configured endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue exactly one request and classify the response
    async fn resolve_once(&self) -> std::result::Result<String, ResolveError> {
        let response = self.client.get(&self.endpoint).send().await.map_err(|e| {
            let msg = if e.is_timeout() {
                format!("timeout requesting '{}'", self.endpoint)
            } else if e.is_connect() {
                format!("connection failed for '{}': {}", self.endpoint, e)
            } else {
                format!("request to '{}' failed: {}", self.endpoint, e)
            };
            ResolveError::Transport(msg)
        })?;

        let status = response.status();
        if REDIRECT_STATUSES.contains(&status) {
            return response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .filter(|location| !location.is_empty())
                .map(str::to_string)
                .ok_or(ResolveError::MissingLocation);
        }

        if status == StatusCode::OK {
            // No redirect happened; the endpoint itself is served as the image
            tracing::debug!(endpoint = %self.endpoint, "Endpoint answered 200 without redirect");
            return Ok(self.endpoint.clone());
        }

        Err(ResolveError::UnexpectedStatus(status.as_u16()))
    }
}

#[async_trait::async_trait]
impl UrlResolver for RedirectResolver {
    async fn resolve(&self) -> std::result::Result<String, ResolveError> {
        retry_with_policy(&self.policy, || self.resolve_once()).await
    }
}
