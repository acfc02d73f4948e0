//! Source adapters: one feed document or one aggregator listing in, raw
//! articles out.

pub mod aggregator;
pub mod feed;
mod http;

use crate::model::RawArticle;
use crate::retry::RetryPolicy;
use crate::util::{origin_key, parse_source_url, SourceUrlError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Aggregator sites reject anonymous agents.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Pacing key shared by every aggregator listing request.
pub const AGGREGATOR_PACE_KEY: &str = "aggregator";

/// One configured place to collect articles from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Feed {
        name: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_entries: Option<usize>,
    },
    Aggregator {
        community: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_posts: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_popularity: Option<i64>,
    },
}

impl SourceDescriptor {
    pub fn feed(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Feed {
            name: name.into(),
            url: url.into(),
            max_entries: None,
        }
    }

    pub fn aggregator(community: impl Into<String>) -> Self {
        Self::Aggregator {
            community: community.into(),
            max_posts: None,
            min_popularity: None,
        }
    }

    /// The `source` label carried by articles from this descriptor.
    pub fn display_name(&self) -> String {
        match self {
            Self::Feed { name, .. } => name.clone(),
            Self::Aggregator { community, .. } => aggregator::community_label(community),
        }
    }
}

/// Failure to fetch or parse a single source.
///
/// Never escapes the Collector: the failing source contributes no articles.
#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Invalid source URL: {0}")]
    InvalidUrl(#[from] SourceUrlError),
}

/// Fetches articles for one source descriptor.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Returns the source's articles published at or after `cutoff`.
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RawArticle>, SourceFetchError>;

    /// Requests sharing a key are spaced by the Collector's rate limiter.
    fn pace_key(&self, source: &SourceDescriptor) -> String {
        match source {
            SourceDescriptor::Feed { url, .. } => origin_key(url),
            SourceDescriptor::Aggregator { .. } => AGGREGATOR_PACE_KEY.to_string(),
        }
    }
}

/// Per-request limits for [`HttpSourceAdapter`].
#[derive(Debug, Clone)]
pub struct SourceLimits {
    /// Entries considered per feed when the descriptor doesn't say
    pub feed_entry_limit: usize,
    /// Posts considered per community when the descriptor doesn't say
    pub aggregator_post_limit: usize,
    pub aggregator_min_popularity: i64,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub aggregator_base_url: String,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            feed_entry_limit: 10,
            aggregator_post_limit: 5,
            aggregator_min_popularity: 50,
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            aggregator_base_url: "https://www.reddit.com".to_string(),
        }
    }
}

/// Production adapter: feeds and aggregator listings over one shared client.
#[derive(Debug, Clone)]
pub struct HttpSourceAdapter {
    client: reqwest::Client,
    limits: SourceLimits,
}

impl HttpSourceAdapter {
    pub fn new(limits: SourceLimits) -> Result<Self, SourceFetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self::with_client(client, limits))
    }

    pub fn with_client(client: reqwest::Client, limits: SourceLimits) -> Self {
        Self { client, limits }
    }

    pub fn limits(&self) -> &SourceLimits {
        &self.limits
    }

    async fn fetch_feed(
        &self,
        name: &str,
        url: &str,
        max_entries: usize,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RawArticle>, SourceFetchError> {
        parse_source_url(url)?;
        let bytes =
            http::get_bytes(&self.client, url, self.limits.request_timeout, self.limits.retry)
                .await?;

        let result = feed::parse_feed(&bytes, name, max_entries, cutoff, Utc::now())
            .map_err(|e| SourceFetchError::Parse(e.to_string()))?;

        if result.skipped > 0 || result.stale > 0 {
            tracing::debug!(
                source = %name,
                skipped = result.skipped,
                stale = result.stale,
                "Dropped feed entries"
            );
        }
        Ok(result.articles)
    }

    async fn fetch_listing(
        &self,
        community: &str,
        max_posts: usize,
        min_popularity: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RawArticle>, SourceFetchError> {
        let url = aggregator::listing_url(&self.limits.aggregator_base_url, community, max_posts);
        parse_source_url(&url)?;
        let bytes =
            http::get_bytes(&self.client, &url, self.limits.request_timeout, self.limits.retry)
                .await?;

        aggregator::parse_listing(
            &bytes,
            community,
            max_posts,
            min_popularity,
            cutoff,
            Utc::now(),
        )
        .map_err(|e| SourceFetchError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SourceAdapter for HttpSourceAdapter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RawArticle>, SourceFetchError> {
        match source {
            SourceDescriptor::Feed {
                name,
                url,
                max_entries,
            } => {
                let max = max_entries.unwrap_or(self.limits.feed_entry_limit).max(1);
                self.fetch_feed(name, url, max, cutoff).await
            }
            SourceDescriptor::Aggregator {
                community,
                max_posts,
                min_popularity,
            } => {
                let max = max_posts.unwrap_or(self.limits.aggregator_post_limit).max(1);
                let min = min_popularity.unwrap_or(self.limits.aggregator_min_popularity);
                self.fetch_listing(community, max, min, cutoff).await
            }
        }
    }

    fn pace_key(&self, source: &SourceDescriptor) -> String {
        match source {
            SourceDescriptor::Feed { url, .. } => origin_key(url),
            SourceDescriptor::Aggregator { .. } => origin_key(&self.limits.aggregator_base_url),
        }
    }
}
