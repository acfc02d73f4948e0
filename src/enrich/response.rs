use super::scorer::ScoringError;
use crate::model::{Category, EnrichedArticle, RawArticle, Score, Sentiment, MAX_KEY_POINTS};
use serde::Deserialize;

/// Top-level response shape. Anything else is malformed.
#[derive(Debug, Deserialize)]
struct Envelope {
    articles: Vec<serde_json::Value>,
}

/// One scored item. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScoredItem {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "key_insights")]
    pub key_points: Option<Vec<String>>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Removes a surrounding markdown code fence such as "```json ... ```".
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json"): up to the newline, or on a single-line
    // fence up to the first whitespace or brace
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest
            .find(|c: char| c.is_whitespace() || c == '{' || c == '[')
            .map_or("", |i| &rest[i..]),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parses the scoring service's completion text into scored items.
///
/// Items with a wrongly-typed field are dropped; their positions fall back.
///
/// # Errors
///
/// [`ScoringError::Malformed`] if the text is not a JSON object with an
/// `articles` array, after stripping code fences and surrounding prose.
pub fn parse_scoring_response(text: &str) -> Result<Vec<ScoredItem>, ScoringError> {
    let envelope = parse_envelope(text)?;

    let total = envelope.articles.len();
    let items: Vec<ScoredItem> = envelope
        .articles
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ScoredItem>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed scored item");
                None
            }
        })
        .collect();

    if items.len() < total {
        tracing::debug!(parsed = items.len(), total = total, "Some scored items were dropped");
    }
    Ok(items)
}

fn parse_envelope(text: &str) -> Result<Envelope, ScoringError> {
    let unfenced = strip_code_fences(text);
    match serde_json::from_str::<Envelope>(unfenced) {
        Ok(envelope) => Ok(envelope),
        Err(first) => {
            // Fall back to the outermost {...} span of the whole reply, for
            // replies wrapped in prose or in a fence strip_code_fences missed
            let trimmed = text.trim();
            let span = trimmed
                .find('{')
                .zip(trimmed.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &trimmed[start..=end]);
            match span {
                Some(span) if span != unfenced => serde_json::from_str(span)
                    .map_err(|e| ScoringError::Malformed(e.to_string())),
                _ => Err(ScoringError::Malformed(first.to_string())),
            }
        }
    }
}

/// Joins a batch with its scored items by 1-based `index`.
///
/// Missing, zero, out-of-range and repeated indices are ignored (the first
/// item for an index wins). Unmatched articles get fallback values; matched
/// articles get fallback values only for the fields the item leaves out.
pub fn merge_batch(batch: Vec<RawArticle>, items: Vec<ScoredItem>) -> Vec<EnrichedArticle> {
    let mut slots: Vec<Option<ScoredItem>> = vec![None; batch.len()];

    for item in items {
        let Some(index) = item.index else {
            tracing::debug!("Scored item without index ignored");
            continue;
        };
        match index.checked_sub(1).and_then(|i| slots.get_mut(i)) {
            Some(slot) if slot.is_none() => *slot = Some(item),
            Some(_) =>tracing::debug!(index = index, "Duplicate scored index ignored"),
            None => tracing::debug!(index = index, "Out-of-range scored index ignored"),
        }
    }

    batch
        .into_iter()
        .zip(slots)
        .map(|(raw, slot)| match slot {
            Some(item) => apply_item(raw, item),
            None => EnrichedArticle::fallback(raw),
        })
        .collect()
}

fn apply_item(raw: RawArticle, item: ScoredItem) -> EnrichedArticle {
    let relevance_score = item
        .relevance_score
        .and_then(Score::from_f64)
        .unwrap_or(Score::FALLBACK);
    let category = item
        .category
        .as_deref()
        .map_or(Category::Other, Category::parse_lenient);
    let sentiment = item
        .sentiment
        .as_deref()
        .map_or(Sentiment::Neutral, Sentiment::parse_lenient);
    let key_points = item
        .key_points
        .unwrap_or_default()
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .take(MAX_KEY_POINTS)
        .collect();
    let summary = item
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| raw.description.clone());

    EnrichedArticle {
        raw,
        relevance_score,
        category,
        key_points,
        summary,
        sentiment,
        scored: true,
    }
}
