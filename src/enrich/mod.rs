//! Batch scoring of raw articles.
//!
//! Articles are scored in fixed-size batches, strictly one batch at a time.
//! A batch whose call or response fails gets fallback values for every
//! article; the pipeline itself never fails here.

mod prompt;
mod response;
mod scorer;

pub use prompt::build_prompt;
pub use response::{merge_batch, parse_scoring_response, strip_code_fences, ScoredItem};
pub use scorer::{
    DisabledScorer, GeminiScorer, ScoringError, ScoringService, API_KEY_ENV, DEFAULT_BASE_URL,
    DEFAULT_MODEL,
};

use crate::model::{EnrichedArticle, RawArticle};
use crate::rate_limit::RateLimiter;

/// Pacing key for scoring calls.
pub const SCORING_PACE_KEY: &str = "scoring";

pub struct Enricher<S> {
    scorer: S,
    batch_size: usize,
    limiter: RateLimiter,
}

impl<S: ScoringService> Enricher<S> {
    /// `limiter` spaces consecutive batches; the first batch is not delayed.
    pub fn new(scorer: S, batch_size: usize, limiter: RateLimiter) -> Self {
        Self {
            scorer,
            batch_size: batch_size.max(1),
            limiter,
        }
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns one enriched article per input, in input order.
    pub async fn enrich(&self, articles: Vec<RawArticle>) -> Vec<EnrichedArticle> {
        if articles.is_empty() {
            return Vec::new();
        }

        if !self.scorer.is_enabled() {
            tracing::info!(
                articles = articles.len(),
                "Scoring service disabled, using fallback values"
            );
            return articles.into_iter().map(EnrichedArticle::fallback).collect();
        }

        let total = articles.len();
        let mut enriched = Vec::with_capacity(total);
        let mut remaining = articles.into_iter();
        let mut batch_no = 0usize;

        loop {
            let batch: Vec<RawArticle> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            batch_no += 1;
            self.limiter.acquire(SCORING_PACE_KEY).await;
            enriched.extend(self.enrich_batch(batch_no, batch).await);
        }

        let scored = enriched.iter().filter(|a| a.scored).count();
        tracing::info!(
            articles = total,
            batches = batch_no,
            scored = scored,
            service = self.scorer.name(),
            "Enrichment complete"
        );
        enriched
    }

    async fn enrich_batch(&self, batch_no: usize, batch: Vec<RawArticle>) -> Vec<EnrichedArticle> {
        let prompt = build_prompt(&batch);

        let items = match self.scorer.complete(&prompt).await {
            Ok(text) => parse_scoring_response(&text),
            Err(e) => Err(e),
        };

        match items {
            Ok(items) => {
                tracing::debug!(
                    batch = batch_no,
                    size = batch.len(),
                    items = items.len(),
                    "Scored batch"
                );
                merge_batch(batch, items)
            }
            Err(e) => {
                tracing::warn!(
                    batch = batch_no,
                    size = batch.len(),
                    error = %e,
                    "Scoring failed, using fallback values for batch"
                );
                batch.into_iter().map(EnrichedArticle::fallback).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, OriginKind, Score};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned replies and records prompts.
    struct Scripted {
        replies: Mutex<Vec<Result<String, ScoringError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ScoringError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScoringService for Scripted {
        async fn complete(&self, prompt: &str) -> Result<String, ScoringError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ScoringError::EmptyResponse))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn articles(n: usize) -> Vec<RawArticle> {
        let published_at = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        (1..=n)
            .map(|i| RawArticle {
                title: format!("Title {i}"),
                url: format!("https://example.com/{i}"),
                description: format!("Description {i}"),
                source: "Example".to_string(),
                published_at,
                origin_kind: OriginKind::Feed,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batches_in_order() {
        let scorer = Scripted::new(vec![
            Ok(r#"{"articles": [{"index": 2, "relevance_score": 70, "category": "Science"}]}"#.to_string()),
            Ok(r#"{"articles": [{"index": 1, "relevance_score": 90}]}"#.to_string()),
        ]);
        let enricher = Enricher::new(scorer, 2, RateLimiter::unlimited());
        let enriched = enricher.enrich(articles(3)).await;

        assert_eq!(enriched.len(), 3);
        let titles: Vec<_> = enriched.iter().map(|a| a.title()).collect();
        assert_eq!(titles, vec!["Title 1", "Title 2", "Title 3"]);
        assert!(!enriched[0].scored);
        assert_eq!(enriched[1].category, Category::Science);
        assert_eq!(enriched[2].relevance_score.value(), 90);

        let prompts = enricher.scorer().prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Article 1:\nTitle: Title 3"));
    }

    #[tokio::test]
    async fn test_failed_batch_falls_back_alone() {
        let scorer = Scripted::new(vec![
            Err(ScoringError::HttpStatus(500)),
            Ok(r#"{"articles": [{"index": 1, "relevance_score": 77}]}"#.to_string()),
        ]);
        let enricher = Enricher::new(scorer, 1, RateLimiter::unlimited());
        let enriched = enricher.enrich(articles(2)).await;

        assert_eq!(enriched[0], EnrichedArticle::fallback(articles(2).remove(0)));
        assert_eq!(enriched[1].relevance_score.value(), 77);
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back() {
        let scorer = Scripted::new(vec![Ok("I cannot help with that.".to_string())]);
        let enricher = Enricher::new(scorer, 5, RateLimiter::unlimited());
        let enriched = enricher.enrich(articles(3)).await;

        assert!(enriched.iter().all(|a| !a.scored
            && a.relevance_score == Score::FALLBACK
            && a.category == Category::Other));
    }

    #[tokio::test]
    async fn test_disabled_scorer_skips_calls() {
        let enricher = Enricher::new(DisabledScorer, 5, RateLimiter::unlimited());
        let enriched = enricher.enrich(articles(4)).await;
        assert_eq!(enriched.len(), 4);
        assert!(enriched.iter().all(|a| !a.scored));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_batches() {
        let replies = (0..3)
            .map(|_| Ok(r#"{"articles": []}"#.to_string()))
            .collect();
        let enricher = Enricher::new(
            Scripted::new(replies),
            2,
            RateLimiter::new(Duration::from_secs(2)),
        );

        let start = tokio::time::Instant::now();
        enricher.enrich(articles(5)).await;
        // Three batches: the first starts immediately, then two pauses
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let enricher = Enricher::new(Scripted::new(Vec::new()), 5, RateLimiter::unlimited());
        assert!(enricher.enrich(Vec::new()).await.is_empty());
        assert!(enricher.scorer().prompts.lock().unwrap().is_empty());
    }
}
