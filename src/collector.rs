use crate::model::RawArticle;
use crate::rate_limit::RateLimiter;
use crate::source::{SourceAdapter, SourceDescriptor};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Duration;

/// Fans out to every source and merges the results.
pub struct Collector<A> {
    adapter: A,
    limiter: RateLimiter,
    max_concurrent: usize,
    source_timeout: Duration,
}

impl<A: SourceAdapter> Collector<A> {
    /// `limiter` spaces requests that share an origin; `source_timeout` bounds
    /// each source's fetch including retries.
    pub fn new(
        adapter: A,
        limiter: RateLimiter,
        max_concurrent: usize,
        source_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            limiter,
            max_concurrent: max_concurrent.max(1),
            source_timeout,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Fetches all sources concurrently and returns their articles merged in
    /// source-list order, deduplicated by `(source, url)`.
    ///
    /// A failing or timed-out source contributes nothing; this never errors.
    pub async fn collect(
        &self,
        sources: &[SourceDescriptor],
        cutoff: DateTime<Utc>,
    ) -> Vec<RawArticle> {
        if sources.is_empty() {
            return Vec::new();
        }

        // `buffered` yields in input order, which keeps the merge deterministic
        let per_source: Vec<Vec<RawArticle>> = stream::iter(sources.iter())
            .map(|source| self.fetch_one(source, cutoff))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let fetched: usize = per_source.iter().map(Vec::len).sum();
        let articles = dedup_articles(per_source.into_iter().flatten().collect());

        tracing::info!(
            sources = sources.len(),
            fetched = fetched,
            unique = articles.len(),
            "Collection complete"
        );
        articles
    }

    async fn fetch_one(&self, source: &SourceDescriptor, cutoff: DateTime<Utc>) -> Vec<RawArticle> {
        let name = source.display_name();
        self.limiter.acquire(&self.adapter.pace_key(source)).await;

        match tokio::time::timeout(self.source_timeout, self.adapter.fetch(source, cutoff)).await {
            Ok(Ok(articles)) => {
                tracing::debug!(source = %name, count = articles.len(), "Fetched source");
                articles
            }
            Ok(Err(e)) => {
                tracing::warn!(source = %name, error = %e, "Source fetch failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    source = %name,
                    timeout_secs = self.source_timeout.as_secs(),
                    "Source fetch timed out"
                );
                Vec::new()
            }
        }
    }
}

/// Drops repeated `(source, url)` pairs, keeping the first occurrence.
pub fn dedup_articles(articles: Vec<RawArticle>) -> Vec<RawArticle> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(articles.len());
    articles
        .into_iter()
        .filter(|a| {
            let (source, url) = a.dedup_key();
            seen.insert((source.to_string(), url.to_string()))
        })
        .collect()
}
