//! The digest facade: a TTL cache in front of the collect, enrich and rank
//! pipeline.
//!
//! # State
//!
//! ```text
//! Empty ──build──> Ready ──ttl──> Stale ──build──> Ready ...
//! ```
//!
//! `Building` overlays whichever state holds while a rebuild runs. The cached
//! digest is only ever replaced wholesale, and never by an empty run.
//!
//! # Concurrency
//!
//! At most one rebuild runs at a time. Callers that arrive during a rebuild
//! wait for it and receive its result rather than starting another.

use crate::collector::Collector;
use crate::config::Config;
use crate::enrich::{Enricher, ScoringService};
use crate::model::Digest;
use crate::rank::Ranker;
use crate::rate_limit::RateLimiter;
use crate::source::{SourceAdapter, SourceDescriptor};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// Every source came back empty and there is no earlier digest to serve.
    #[error("No articles available from any source")]
    NoArticlesAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestState {
    Empty,
    Building,
    Ready,
    Stale,
}

struct Cached {
    digest: Arc<Digest>,
    built_at: Instant,
}

/// Clears the building flag when a rebuild ends, including on cancellation.
struct BuildingGuard<'a>(&'a AtomicBool);

impl<'a> BuildingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct DigestFacade<A, S> {
    collector: Collector<A>,
    enricher: Enricher<S>,
    ranker: Ranker,
    sources: Vec<SourceDescriptor>,
    recency_cutoff: chrono::Duration,
    ttl: Duration,
    cache: RwLock<Option<Cached>>,
    build_lock: tokio::sync::Mutex<()>,
    building: AtomicBool,
    /// Bumped each time a new digest is stored
    generation: AtomicU64,
}

impl<A: SourceAdapter, S: ScoringService> DigestFacade<A, S> {
    pub fn new(
        collector: Collector<A>,
        enricher: Enricher<S>,
        ranker: Ranker,
        sources: Vec<SourceDescriptor>,
        recency_cutoff: chrono::Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            collector,
            enricher,
            ranker,
            sources,
            recency_cutoff,
            ttl,
            cache: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
            building: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Wires the pipeline from configuration.
    pub fn from_config(adapter: A, scorer: S, config: &Config) -> Self {
        let collector = Collector::new(
            adapter,
            RateLimiter::new(config.source_pause()),
            config.max_concurrent_fetches,
            config.source_timeout(),
        );
        let enricher = Enricher::new(
            scorer,
            config.batch_size,
            RateLimiter::new(config.batch_pause()),
        );
        let ranker = Ranker::new(config.digest_limit, config.min_score());

        Self::new(
            collector,
            enricher,
            ranker,
            config.sources.clone(),
            config.recency_cutoff(),
            config.cache_ttl(),
        )
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn state(&self) -> DigestState {
        if self.building.load(Ordering::Acquire) {
            return DigestState::Building;
        }
        let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
        match cache.as_ref() {
            None => DigestState::Empty,
            Some(cached) if cached.built_at.elapsed() > self.ttl => DigestState::Stale,
            Some(_) => DigestState::Ready,
        }
    }

    /// The last stored digest, fresh or not.
    pub fn cached(&self) -> Option<Arc<Digest>> {
        let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
        cache.as_ref().map(|c| Arc::clone(&c.digest))
    }

    fn fresh(&self) -> Option<Arc<Digest>> {
        let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
        cache
            .as_ref()
            .filter(|c| c.built_at.elapsed() <= self.ttl)
            .map(|c| Arc::clone(&c.digest))
    }

    /// Returns the cached digest while it is fresh, otherwise rebuilds it.
    ///
    /// `force_refresh` rebuilds regardless of age, unless another caller's
    /// rebuild finished while this one was waiting; that result is returned
    /// instead.
    ///
    /// # Errors
    ///
    /// [`DigestError::NoArticlesAvailable`] when a rebuild finds nothing and no
    /// earlier digest exists. With an earlier digest, that digest is returned
    /// unchanged.
    pub async fn get_digest(&self, force_refresh: bool) -> Result<Arc<Digest>, DigestError> {
        if !force_refresh {
            if let Some(digest) = self.fresh() {
                return Ok(digest);
            }
        }

        let seen_generation = self.generation.load(Ordering::Acquire);
        let _lock = self.build_lock.lock().await;

        if self.generation.load(Ordering::Acquire) != seen_generation {
            if let Some(digest) = self.cached() {
                tracing::debug!("Serving digest built while waiting");
                return Ok(digest);
            }
        }
        if !force_refresh {
            if let Some(digest) = self.fresh() {
                return Ok(digest);
            }
        }

        let _building = BuildingGuard::new(&self.building);
        let digest = self.build().await;

        if digest.is_empty() {
            return match self.cached() {
                Some(previous) => {
                    tracing::warn!(
                        generated_at = %previous.generated_at,
                        "Rebuild found no articles, keeping previous digest"
                    );
                    Ok(previous)
                }
                None => {
                    tracing::warn!("Rebuild found no articles and no digest is cached");
                    Err(DigestError::NoArticlesAvailable)
                }
            };
        }

        let digest = Arc::new(digest);
        {
            let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
            *cache = Some(Cached {
                digest: Arc::clone(&digest),
                built_at: Instant::now(),
            });
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::info!(
            articles = digest.len(),
            sources = digest.source_count,
            generated_at = %digest.generated_at,
            "Digest ready"
        );
        Ok(digest)
    }

    async fn build(&self) -> Digest {
        let started = Instant::now();
        let cutoff = Utc::now() - self.recency_cutoff;

        tracing::info!(sources = self.sources.len(), cutoff = %cutoff, "Building digest");

        let raw = self.collector.collect(&self.sources, cutoff).await;
        if raw.is_empty() {
            return Digest::new(Utc::now(), Vec::new());
        }
        let enriched = self.enricher.enrich(raw).await;
        let ranked = self.ranker.rank(enriched);

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );
        Digest::new(Utc::now(), ranked)
    }
}
