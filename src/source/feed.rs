use crate::model::{OriginKind, RawArticle};
use crate::util::normalize_description;
use chrono::{DateTime, Utc};
use feed_rs::parser;

/// Outcome of parsing one feed document.
#[derive(Debug)]
pub struct ParseResult {
    pub articles: Vec<RawArticle>,
    /// Entries dropped because they had no link
    pub skipped: usize,
    /// Entries dropped because they predate the cutoff
    pub stale: usize,
}

/// Parses an RSS/Atom/JSON feed into raw articles.
///
/// Only the first `max_entries` entries in document order are considered.
/// An entry is kept unless its publication (or update) time is known and older
/// than `cutoff`; entries without a parseable date are stamped with `now`.
pub fn parse_feed(
    bytes: &[u8],
    source_name: &str,
    max_entries: usize,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<ParseResult, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let mut articles = Vec::new();
    let mut skipped = 0;
    let mut stale = 0;

    for entry in feed.entries.into_iter().take(max_entries) {
        let url = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .filter(|href| !href.is_empty());
        let Some(url) = url else {
            skipped += 1;
            continue;
        };

        let published = entry.published.or(entry.updated);
        if published.is_some_and(|p| p < cutoff) {
            stale += 1;
            continue;
        }

        let title = entry
            .title
            .map(|t| normalize_description(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        articles.push(RawArticle {
            title,
            url,
            description: normalize_description(&summary),
            source: source_name.to_string(),
            published_at: published.unwrap_or(now),
            origin_kind: OriginKind::Feed,
        });
    }

    Ok(ParseResult {
        articles,
        skipped,
        stale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap()
    }

    fn cutoff() -> DateTime<Utc> {
        now() - Duration::days(1)
    }

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example</title>
    <item>
        <title>Fresh story</title>
        <link>https://example.com/fresh</link>
        <description><![CDATA[<p>Big <b>news</b> &amp; more</p>]]></description>
        <pubDate>Sat, 02 Mar 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>Old story</title>
        <link>https://example.com/old</link>
        <pubDate>Wed, 28 Feb 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>Undated story</title>
        <link>https://example.com/undated</link>
        <pubDate>sometime last week</pubDate>
    </item>
    <item>
        <title>No link</title>
    </item>
</channel></rss>"#;

    #[test]
    fn test_parse_filters_and_normalizes() {
        let result = parse_feed(RSS.as_bytes(), "Example", 10, cutoff(), now()).unwrap();

        let titles: Vec<_> = result.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Fresh story", "Undated story"]);
        assert_eq!(result.stale, 1);
        assert_eq!(result.skipped, 1);

        let fresh = &result.articles[0];
        assert_eq!(fresh.url, "https://example.com/fresh");
        assert_eq!(fresh.description, "Big news & more");
        assert_eq!(fresh.source, "Example");
        assert_eq!(fresh.origin_kind, OriginKind::Feed);
        assert_eq!(
            fresh.published_at,
            Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unparseable_date_defaults_to_now() {
        let result = parse_feed(RSS.as_bytes(), "Example", 10, cutoff(), now()).unwrap();
        let undated = result
            .articles
            .iter()
            .find(|a| a.title == "Undated story")
            .unwrap();
        assert_eq!(undated.published_at, now());
    }

    #[test]
    fn test_max_entries_applies_in_document_order() {
        let result = parse_feed(RSS.as_bytes(), "Example", 2, cutoff(), now()).unwrap();
        // Only "Fresh" and "Old" are considered; "Old" is then dropped as stale
        assert_eq!(result.articles.len(), 1);
        assert_eq!(result.articles[0].title, "Fresh story");
        assert_eq!(result.stale, 1);
    }

    #[test]
    fn test_atom_feed() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <id>urn:uuid:feed</id>
  <updated>2024-03-02T09:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:uuid:1</id>
    <link href="https://example.org/atom-1"/>
    <updated>2024-03-02T09:00:00Z</updated>
    <summary>Plain summary</summary>
  </entry>
</feed>"#;
        let result = parse_feed(atom.as_bytes(), "Atom", 10, cutoff(), now()).unwrap();
        assert_eq!(result.articles.len(), 1);
        assert_eq!(result.articles[0].url, "https://example.org/atom-1");
        assert_eq!(result.articles[0].description, "Plain summary");
    }

    #[test]
    fn test_long_summary_truncated() {
        let body = "x".repeat(2_000);
        let rss = format!(
            r#"<rss version="2.0"><channel><item><title>T</title><link>https://e.com/1</link><description>{body}</description></item></channel></rss>"#
        );
        let result = parse_feed(rss.as_bytes(), "E", 10, cutoff(), now()).unwrap();
        let description = &result.articles[0].description;
        assert_eq!(description.chars().count(), crate::util::MAX_DESCRIPTION_CHARS);
        assert!(description.ends_with(crate::util::TRUNCATION_MARKER));
    }

    #[test]
    fn test_invalid_xml_is_error() {
        assert!(parse_feed(b"<not valid xml", "E", 10, cutoff(), now()).is_err());
    }

    #[test]
    fn test_empty_channel() {
        let rss = r#"<rss version="2.0"><channel></channel></rss>"#;
        let result = parse_feed(rss.as_bytes(), "E", 10, cutoff(), now()).unwrap();
        assert!(result.articles.is_empty());
    }
}
