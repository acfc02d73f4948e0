use crate::model::{OriginKind, RawArticle};
use crate::util::normalize_description;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Public site root used to build post links.
const POST_URL_BASE: &str = "https://reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    permalink: String,
    #[serde(default)]
    selftext: String,
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    stickied: bool,
}

/// Display name for a community, e.g. `r/programming`.
pub fn community_label(community: &str) -> String {
    format!("r/{community}")
}

/// Listing URL for a community's hot posts.
pub fn listing_url(base_url: &str, community: &str, max_posts: usize) -> String {
    format!(
        "{}/r/{}/hot.json?limit={}",
        base_url.trim_end_matches('/'),
        community,
        max_posts
    )
}

/// Parses a "hot" listing into raw articles.
///
/// Pinned posts are ignored. Of the remaining posts, only the top `max_posts`
/// are considered; those below `min_popularity` or created before `cutoff` are
/// dropped.
pub fn parse_listing(
    bytes: &[u8],
    community: &str,
    max_posts: usize,
    min_popularity: i64,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<RawArticle>, serde_json::Error> {
    let listing: Listing = serde_json::from_slice(bytes)?;
    let source = community_label(community);

    let articles = listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.stickied)
        .take(max_posts)
        .filter(|post| post.score >= min_popularity)
        .filter_map(|post| {
            let published_at = DateTime::from_timestamp(post.created_utc as i64, 0).unwrap_or(now);
            if published_at < cutoff {
                return None;
            }
            let title = normalize_description(&post.title);
            if title.is_empty() || post.permalink.is_empty() {
                return None;
            }
            Some(RawArticle {
                title,
                url: format!("{POST_URL_BASE}{}", post.permalink),
                description: normalize_description(&post.selftext),
                source: source.clone(),
                published_at,
                origin_kind: OriginKind::Aggregator,
            })
        })
        .collect();

    Ok(articles)
}
