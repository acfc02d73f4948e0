use crate::model::{EnrichedArticle, Score};
use std::cmp::Ordering;

/// Orders and trims enriched articles for a digest.
#[derive(Debug, Clone, Copy)]
pub struct Ranker {
    limit: usize,
    min_score: Option<Score>,
}

impl Ranker {
    pub fn new(limit: usize, min_score: Option<Score>) -> Self {
        Self {
            limit: limit.max(1),
            min_score,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn min_score(&self) -> Option<Score> {
        self.min_score
    }

    /// Filters by `min_score`, sorts with [`compare_rank`] and truncates to
    /// `limit`.
    ///
    /// If no article meets `min_score`, the unfiltered set is used instead, so
    /// a non-empty input always yields a non-empty result.
    pub fn rank(&self, articles: Vec<EnrichedArticle>) -> Vec<EnrichedArticle> {
        let mut ranked = match self.min_score {
            Some(min) if articles.iter().any(|a| a.relevance_score >= min) => articles
                .into_iter()
                .filter(|a| a.relevance_score >= min)
                .collect(),
            Some(min) => {
                if !articles.is_empty() {
                    tracing::debug!(
                        min_score = min.value(),
                        articles = articles.len(),
                        "No article meets the minimum score, ranking all"
                    );
                }
                articles
            }
            None => articles,
        };

        ranked.sort_by(compare_rank);
        ranked.truncate(self.limit);
        ranked
    }
}

/// Score descending, then newest first, then source and url ascending.
pub fn compare_rank(a: &EnrichedArticle, b: &EnrichedArticle) -> Ordering {
    b.relevance_score
        .cmp(&a.relevance_score)
        .then_with(|| b.published_at().cmp(&a.published_at()))
        .then_with(|| a.source().cmp(b.source()))
        .then_with(|| a.url().cmp(b.url()))
}
