//! Integration tests for the digest facade: TTL caching, forced refresh,
//! single-flight rebuilds, and behavior when every source comes back empty.
//!
//! Time is paused so TTL expiry is driven with `tokio::time::advance`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdigest::enrich::DisabledScorer;
use newsdigest::model::{OriginKind, RawArticle};
use newsdigest::{
    Collector, DigestError, DigestFacade, DigestState, Enricher, Ranker, RateLimiter,
    SourceAdapter, SourceDescriptor, SourceFetchError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(30 * 60);

/// Counts fetches; returns nothing while `empty` is set.
struct CountingAdapter {
    fetches: Arc<AtomicUsize>,
    empty: Arc<AtomicBool>,
    delay: Duration,
}

#[async_trait]
impl SourceAdapter for CountingAdapter {
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        _cutoff: DateTime<Utc>,
    ) -> Result<Vec<RawArticle>, SourceFetchError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.empty.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![RawArticle {
            title: format!("Story {n}"),
            url: format!("https://example.com/{n}"),
            description: "Something happened".to_string(),
            source: source.display_name(),
            published_at: Utc::now(),
            origin_kind: OriginKind::Feed,
        }])
    }
}

struct Harness {
    facade: DigestFacade<CountingAdapter, DisabledScorer>,
    fetches: Arc<AtomicUsize>,
    empty: Arc<AtomicBool>,
}

fn harness(delay: Duration, start_empty: bool) -> Harness {
    let fetches = Arc::new(AtomicUsize::new(0));
    let empty = Arc::new(AtomicBool::new(start_empty));
    let adapter = CountingAdapter {
        fetches: Arc::clone(&fetches),
        empty: Arc::clone(&empty),
        delay,
    };

    let facade = DigestFacade::new(
        Collector::new(adapter, RateLimiter::unlimited(), 4, Duration::from_secs(60)),
        Enricher::new(DisabledScorer, 5, RateLimiter::unlimited()),
        Ranker::new(10, None),
        vec![SourceDescriptor::feed("Example", "https://example.com/feed.xml")],
        chrono::Duration::hours(24),
        TTL,
    );

    Harness {
        facade,
        fetches,
        empty,
    }
}

#[tokio::test(start_paused = true)]
async fn test_cached_within_ttl() {
    let h = harness(Duration::ZERO, false);
    assert_eq!(h.facade.state(), DigestState::Empty);

    let first = h.facade.get_digest(false).await.unwrap();
    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    let second = h.facade.get_digest(false).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.generated_at, second.generated_at);
    assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.facade.state(), DigestState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_rebuilt_after_ttl() {
    let h = harness(Duration::ZERO, false);

    let first = h.facade.get_digest(false).await.unwrap();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    assert_eq!(h.facade.state(), DigestState::Stale);

    let second = h.facade.get_digest(false).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.generated_at >= first.generated_at);
    assert_eq!(second.items[0].title(), "Story 2");
    assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(h.facade.state(), DigestState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_rebuilds() {
    let h = harness(Duration::ZERO, false);

    let first = h.facade.get_digest(false).await.unwrap();
    let forced = h.facade.get_digest(true).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &forced));
    assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_sources_on_empty_cache() {
    let h = harness(Duration::ZERO, true);

    let result = h.facade.get_digest(false).await;

    assert_eq!(result.unwrap_err(), DigestError::NoArticlesAvailable);
    assert_eq!(h.facade.state(), DigestState::Empty);
    assert!(h.facade.cached().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_empty_sources_keep_previous_digest() {
    let h = harness(Duration::ZERO, false);
    let good = h.facade.get_digest(false).await.unwrap();

    h.empty.store(true, Ordering::SeqCst);
    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    let after = h.facade.get_digest(false).await.unwrap();
    assert!(Arc::ptr_eq(&good, &after));
    assert_eq!(h.fetches.load(Ordering::SeqCst), 2);

    let forced = h.facade.get_digest(true).await.unwrap();
    assert!(Arc::ptr_eq(&good, &forced));
    assert!(Arc::ptr_eq(&good, &h.facade.cached().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_build() {
    let h = harness(Duration::from_secs(2), false);

    let results =
        futures::future::join_all((0..5).map(|_| h.facade.get_digest(false))).await;

    assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    let digests: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    for d in &digests[1..] {
        assert!(Arc::ptr_eq(&digests[0], d));
    }
}

#[tokio::test(start_paused = true)]
async fn test_forced_request_during_build_waits_for_it() {
    let h = harness(Duration::from_secs(2), false);

    let (a, b) = tokio::join!(h.facade.get_digest(false), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.facade.get_digest(true).await
    });

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_state_is_building_during_rebuild() {
    let h = harness(Duration::from_secs(2), false);

    let (result, observed) = tokio::join!(h.facade.get_digest(false), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.facade.state()
    });

    assert!(result.is_ok());
    assert_eq!(observed, DigestState::Building);
    assert_eq!(h.facade.state(), DigestState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_digest_contents() {
    let h = harness(Duration::ZERO, false);
    let digest = h.facade.get_digest(false).await.unwrap();

    assert_eq!(digest.len(), 1);
    assert_eq!(digest.source_count, 1);
    // No scoring key: fallback values
    assert!(!digest.items[0].scored);
    assert_eq!(digest.items[0].summary, "Something happened");
}
