use crate::model::{Category, RawArticle};
use crate::util::truncate_with_marker;
use std::fmt::Write;

/// Description characters sent per article.
const PROMPT_DESCRIPTION_CHARS: usize = 300;

/// Builds the scoring prompt for one batch.
///
/// Articles are numbered from 1; the response must echo that number as
/// `index`.
pub fn build_prompt(batch: &[RawArticle]) -> String {
    let categories = Category::ALL
        .iter()
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        r#"Analyze these news articles and respond with JSON of this exact shape:

{{
  "articles": [
    {{
      "index": 1,
      "relevance_score": 85,
      "category": "AI/ML",
      "key_points": ["point one", "point two"],
      "sentiment": "positive",
      "summary": "One or two sentence summary"
    }}
  ]
}}

Rules:
- "index" is the article number given below
- "relevance_score" is an integer from 0 to 100 based on current importance and interest
- "category" is one of: {categories}
- "key_points" has at most 3 short entries
- "sentiment" is one of: "positive", "neutral", "negative"

Articles to analyze:"#
    );

    for (i, article) in batch.iter().enumerate() {
        let description = truncate_with_marker(&article.description, PROMPT_DESCRIPTION_CHARS);
        // Writing to a String never fails
        let _ = write!(
            prompt,
            "\n\nArticle {}:\nTitle: {}\nSource: {}\nDescription: {}",
            i + 1,
            article.title,
            article.source,
            description
        );
    }

    prompt.push_str("\n\nReturn only valid JSON, no additional text.");
    prompt
}
