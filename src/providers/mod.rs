//! Provider adapters.
//!
//! Each adapter wraps one external security system: it owns the transport
//! details, decodes the provider's native payload into typed records, applies
//! the provider's relevance filter and maps survivors to [`AlertItem`]s.
//!
//! Adapters implement [`ProviderAdapter::try_fetch`]; callers use the
//! provided [`ProviderAdapter::fetch`], which never fails.

pub mod defender;
pub mod elastic;
pub mod opencti;
pub mod rss;
pub mod tenable;

#[cfg(test)]
pub(crate) mod test_server;

pub use defender::DefenderAdapter;
pub use elastic::ElasticAdapter;
pub use opencti::OpenCtiAdapter;
pub use rss::RssAdapter;
pub use tenable::TenableAdapter;

use crate::aggregation::eligibility::{self, Eligibility};
use crate::config::{ActiveConfig, HttpConfig};
use crate::models::{AlertItem, ProviderCategory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum bytes of an error body kept for diagnostics.
const ERROR_BODY_LIMIT: usize = 512;

/// Why a provider fetch produced nothing.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Required credentials are missing; the provider was not contacted.
    #[error("not configured (missing: {0})")]
    NotConfigured(String),

    /// Connection-level failure reaching the provider.
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The provider did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The provider or its token endpoint rejected our identity.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-2xx response other than an auth rejection.
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The payload did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NotConfigured(_) => "configuration_missing",
            FetchError::Transport(_) => "transport",
            FetchError::Timeout => "timeout",
            FetchError::Auth(_) => "auth",
            FetchError::Status { .. } => "status",
            FetchError::Malformed(_) => "malformed_response",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transport(err)
        }
    }
}

/// Uniform contract implemented by every provider adapter.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Category this adapter serves.
    fn category(&self) -> ProviderCategory;

    /// Query the provider and normalize its records.
    ///
    /// May return more than `limit` items; [`fetch`](Self::fetch) truncates.
    async fn try_fetch(
        &self,
        config: &ActiveConfig,
        limit: usize,
    ) -> Result<Vec<AlertItem>, FetchError>;

    /// Fetch at most `limit` alerts. Failures are logged and yield an empty list.
    async fn fetch(&self, config: &ActiveConfig, limit: usize) -> Vec<AlertItem> {
        let category = self.category();

        if limit == 0 {
            return Vec::new();
        }

        match eligibility::evaluate(category, config) {
            Eligibility::Eligible => {}
            Eligibility::Inactive => {
                debug!(provider = %category, "Skipping fetch, provider not active");
                return Vec::new();
            }
            Eligibility::Missing(fields) => {
                debug!(provider = %category, "Skipping fetch, missing {}", fields.join(", "));
                return Vec::new();
            }
        }

        match self.try_fetch(config, limit).await {
            Ok(mut items) => {
                items.truncate(limit);
                debug!(provider = %category, count = items.len(), "Fetch complete");
                items
            }
            Err(FetchError::NotConfigured(missing)) => {
                debug!(provider = %category, "Skipping fetch, missing {}", missing);
                Vec::new()
            }
            Err(e) => {
                warn!(provider = %category, kind = e.kind(), "Fetch failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// The five production adapters sharing one HTTP client.
pub fn default_adapters(http: &HttpConfig) -> Vec<Arc<dyn ProviderAdapter>> {
    let client = build_client(http);

    vec![
        Arc::new(ElasticAdapter::new(client.clone())),
        Arc::new(DefenderAdapter::new(client.clone())),
        Arc::new(OpenCtiAdapter::new(client.clone())),
        Arc::new(TenableAdapter::new(client.clone())),
        Arc::new(RssAdapter::new(client, http.feed_timeout())),
    ]
}

/// Build the shared HTTP client.
pub fn build_client(http: &HttpConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(http.request_timeout())
        .user_agent(http.user_agent.clone())
        .build()
        .unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// Map auth rejections and other non-2xx statuses to errors.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    truncate_chars(&mut body, ERROR_BODY_LIMIT);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(FetchError::Auth(format!("{} {}", status, body)))
    } else {
        Err(FetchError::Status { status, body })
    }
}

/// Check the status, then decode the body into a typed payload.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, FetchError> {
    let response = check_status(response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Parse an RFC 3339 or RFC 2822 timestamp.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse the first usable timestamp, falling back to now.
pub(crate) fn timestamp_or_now<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> DateTime<Utc> {
    candidates
        .into_iter()
        .flatten()
        .find_map(parse_timestamp)
        .unwrap_or_else(Utc::now)
}

/// First non-blank value, or the fallback label.
pub(crate) fn first_non_empty<'a>(
    candidates: impl IntoIterator<Item = Option<&'a str>>,
    fallback: &str,
) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Cut `text` to at most `max` characters, on a char boundary.
pub(crate) fn truncate_chars(text: &mut String, max: usize) -> bool {
    match text.char_indices().nth(max) {
        Some((idx, _)) => {
            text.truncate(idx);
            true
        }
        None => false,
    }
}

/// Fetch twice the requested amount so relevance filtering leaves enough.
pub(crate) fn headroom(limit: usize) -> usize {
    limit.saturating_mul(2)
}
