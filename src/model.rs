//! Article and digest data types shared by every pipeline stage.
//!
//! Values flow one way: a source adapter produces [`RawArticle`]s, the
//! enricher wraps each one into an [`EnrichedArticle`], and the digest facade
//! packages the ranked result into an immutable [`Digest`]. No stage mutates a
//! value produced by an earlier one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Raw Articles
// ============================================================================

/// Where an article came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    /// RSS/Atom/JSON feed entry
    Feed,
    /// Link-aggregator "hot" listing post
    Aggregator,
}

/// A normalized article as produced by a source adapter.
///
/// `description` is already HTML-stripped and capped at
/// [`MAX_DESCRIPTION_CHARS`](crate::util::MAX_DESCRIPTION_CHARS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    pub url: String,
    pub description: String,
    /// Display name of the source, e.g. "TechCrunch" or "r/programming"
    pub source: String,
    /// Publication time; collection time when the source gave none
    pub published_at: DateTime<Utc>,
    pub origin_kind: OriginKind,
}

impl RawArticle {
    /// Deduplication key: the same URL from two different sources is kept twice.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.source, &self.url)
    }
}

// ============================================================================
// Enrichment Fields
// ============================================================================

/// Relevance score on the canonical 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MIN: Score = Score(0);
    pub const MAX: Score = Score(100);
    /// Assigned when the scoring service gave no usable answer.
    pub const FALLBACK: Score = Score(50);

    /// Clamps an integer into range.
    pub fn new(value: i64) -> Self {
        Score(value.clamp(0, 100) as u8)
    }

    /// Rounds and clamps a service-provided number. Non-finite input yields `None`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(Score(value.round().clamp(0.0, 100.0) as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Conversion for collaborators that present a 0-10 scale (one decimal).
    pub fn to_ten_scale(self) -> f32 {
        f32::from(self.0) / 10.0
    }
}

impl Default for Score {
    fn default() -> Self {
        Score::FALLBACK
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of digest categories.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Category {
    #[serde(rename = "AI/ML")]
    AiMl,
    Technology,
    Business,
    Science,
    Startups,
    Programming,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::AiMl,
        Category::Technology,
        Category::Business,
        Category::Science,
        Category::Startups,
        Category::Programming,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::AiMl => "AI/ML",
            Category::Technology => "Technology",
            Category::Business => "Business",
            Category::Science => "Science",
            Category::Startups => "Startups",
            Category::Programming => "Programming",
            Category::Other => "Other",
        }
    }

    /// Lenient parse of a label produced by the scoring service or typed by a user.
    ///
    /// Unknown labels map to [`Category::Other`]; the set is closed.
    pub fn parse_lenient(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "aiml" | "ai" | "ml" | "machinelearning" | "artificialintelligence" => Category::AiMl,
            "technology" | "tech" => Category::Technology,
            "business" | "finance" => Category::Business,
            "science" => Category::Science,
            "startups" | "startup" => Category::Startups,
            "programming" | "software" | "development" => Category::Programming,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

// ============================================================================
// Enriched Articles
// ============================================================================

/// Maximum number of key points kept per article.
pub const MAX_KEY_POINTS: usize = 3;

/// A raw article plus scoring-service output. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedArticle {
    #[serde(flatten)]
    pub raw: RawArticle,
    pub relevance_score: Score,
    pub category: Category,
    pub key_points: Vec<String>,
    pub summary: String,
    pub sentiment: Sentiment,
    /// False when the fields above are fallback values
    pub scored: bool,
}

impl EnrichedArticle {
    /// Wraps an article with the fixed fallback values.
    pub fn fallback(raw: RawArticle) -> Self {
        let summary = raw.description.clone();
        Self {
            raw,
            relevance_score: Score::FALLBACK,
            category: Category::Other,
            key_points: Vec::new(),
            summary,
            sentiment: Sentiment::Neutral,
            scored: false,
        }
    }

    pub fn title(&self) -> &str {
        &self.raw.title
    }

    pub fn url(&self) -> &str {
        &self.raw.url
    }

    pub fn source(&self) -> &str {
        &self.raw.source
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.raw.published_at
    }

    fn matches(&self, needle_lower: &str) -> bool {
        self.raw.title.to_lowercase().contains(needle_lower)
            || self.raw.description.to_lowercase().contains(needle_lower)
            || self.summary.to_lowercase().contains(needle_lower)
    }
}

// ============================================================================
// Digest
// ============================================================================

/// Immutable result of one pipeline run, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<EnrichedArticle>,
    /// Distinct source names among `items`
    pub source_count: usize,
    pub category_histogram: BTreeMap<Category, usize>,
}

/// Aggregate numbers handed to the dashboard writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSummary {
    pub total_articles: usize,
    pub avg_relevance: f64,
    pub categories: Vec<Category>,
    pub sources: Vec<String>,
}

impl Digest {
    /// Builds a digest from already-ranked items.
    pub fn new(generated_at: DateTime<Utc>, items: Vec<EnrichedArticle>) -> Self {
        let mut category_histogram = BTreeMap::new();
        for item in &items {
            *category_histogram.entry(item.category).or_insert(0) += 1;
        }
        let source_count = distinct_sources(&items).len();

        Self {
            generated_at,
            items,
            source_count,
            category_histogram,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn top(&self, n: usize) -> &[EnrichedArticle] {
        &self.items[..n.min(self.items.len())]
    }

    /// Case-insensitive substring search over title, description, and summary.
    /// Results keep rank order.
    pub fn search(&self, query: &str) -> Vec<&EnrichedArticle> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.items.iter().filter(|a| a.matches(&needle)).collect()
    }

    pub fn in_category(&self, category: Category) -> Vec<&EnrichedArticle> {
        self.items
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }

    pub fn average_score(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let total: u64 = self
            .items
            .iter()
            .map(|a| u64::from(a.relevance_score.value()))
            .sum();
        total as f64 / self.items.len() as f64
    }

    pub fn summary(&self) -> DigestSummary {
        DigestSummary {
            total_articles: self.items.len(),
            avg_relevance: (self.average_score() * 10.0).round() / 10.0,
            categories: self.category_histogram.keys().copied().collect(),
            sources: distinct_sources(&self.items),
        }
    }
}

/// Source names in first-appearance order.
fn distinct_sources(items: &[EnrichedArticle]) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    for item in items {
        if !seen.iter().any(|s| s == item.source()) {
            seen.push(item.source().to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(title: &str, source: &str, score: i64, category: Category) -> EnrichedArticle {
        let raw = RawArticle {
            title: title.to_string(),
            url: format!("https://example.com/{title}"),
            description: format!("About {title}"),
            source: source.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            origin_kind: OriginKind::Feed,
        };
        EnrichedArticle {
            relevance_score: Score::new(score),
            category,
            scored: true,
            ..EnrichedArticle::fallback(raw)
        }
    }

    #[test]
    fn test_score_clamps() {
        assert_eq!(Score::new(-5).value(), 0);
        assert_eq!(Score::new(250).value(), 100);
        assert_eq!(Score::from_f64(87.6).unwrap().value(), 88);
        assert_eq!(Score::from_f64(1e9).unwrap().value(), 100);
        assert!(Score::from_f64(f64::NAN).is_none());
    }

    #[test]
    fn test_score_ten_scale() {
        assert_eq!(Score::new(75).to_ten_scale(), 7.5);
        assert_eq!(Score::MAX.to_ten_scale(), 10.0);
    }

    #[test]
    fn test_category_parse_lenient() {
        assert_eq!(Category::parse_lenient("AI/ML"), Category::AiMl);
        assert_eq!(Category::parse_lenient(" machine learning "), Category::AiMl);
        assert_eq!(Category::parse_lenient("TECH"), Category::Technology);
        assert_eq!(Category::parse_lenient("Startup"), Category::Startups);
        assert_eq!(Category::parse_lenient("Politics"), Category::Other);
        assert_eq!(Category::parse_lenient(""), Category::Other);
    }

    #[test]
    fn test_category_serializes_display_label() {
        let json = serde_json::to_string(&Category::AiMl).unwrap();
        assert_eq!(json, "\"AI/ML\"");
        for category in Category::ALL {
            assert_eq!(Category::parse_lenient(category.as_str()), category);
        }
    }

    #[test]
    fn test_sentiment_parse_lenient() {
        assert_eq!(Sentiment::parse_lenient("Positive"), Sentiment::Positive);
        assert_eq!(Sentiment::parse_lenient("negative"), Sentiment::Negative);
        assert_eq!(Sentiment::parse_lenient("mixed"), Sentiment::Neutral);
    }

    #[test]
    fn test_fallback_values() {
        let a = article("x", "s", 0, Category::Other);
        let fb = EnrichedArticle::fallback(a.raw.clone());
        assert_eq!(fb.relevance_score, Score::FALLBACK);
        assert_eq!(fb.category, Category::Other);
        assert!(fb.key_points.is_empty());
        assert_eq!(fb.sentiment, Sentiment::Neutral);
        assert_eq!(fb.summary, "About x");
        assert!(!fb.scored);
        assert_eq!(fb.category, Category::default());
        assert_eq!(fb.sentiment, Sentiment::default());
    }

    #[test]
    fn test_digest_histogram_and_sources() {
        let digest = Digest::new(
            Utc::now(),
            vec![
                article("a", "Wired", 90, Category::AiMl),
                article("b", "Wired", 80, Category::AiMl),
                article("c", "r/startups", 70, Category::Startups),
            ],
        );
        assert_eq!(digest.source_count, 2);
        assert_eq!(digest.category_histogram.get(&Category::AiMl), Some(&2));
        assert_eq!(digest.category_histogram.get(&Category::Startups), Some(&1));
        assert_eq!(digest.category_histogram.get(&Category::Other), None);
        assert_eq!(digest.average_score(), 80.0);

        let summary = digest.summary();
        assert_eq!(summary.total_articles, 3);
        assert_eq!(summary.sources, vec!["Wired", "r/startups"]);
        assert_eq!(summary.categories, vec![Category::AiMl, Category::Startups]);
    }

    #[test]
    fn test_digest_search_keeps_rank_order() {
        let digest = Digest::new(
            Utc::now(),
            vec![
                article("Rust 2.0", "A", 90, Category::Programming),
                article("Python news", "B", 80, Category::Programming),
                article("rust belt economy", "C", 70, Category::Business),
            ],
        );
        let hits: Vec<_> = digest.search("RUST").iter().map(|a| a.title()).collect();
        assert_eq!(hits, vec!["Rust 2.0", "rust belt economy"]);
        assert!(digest.search("   ").is_empty());
        assert_eq!(digest.in_category(Category::Business).len(), 1);
        assert_eq!(digest.top(2).len(), 2);
        assert_eq!(digest.top(10).len(), 3);
    }

    #[test]
    fn test_empty_digest_average() {
        let digest = Digest::new(Utc::now(), Vec::new());
        assert!(digest.is_empty());
        assert_eq!(digest.average_score(), 0.0);
        assert_eq!(digest.source_count, 0);
    }
}
