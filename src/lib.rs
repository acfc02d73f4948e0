//! Collects articles from news feeds and community aggregators, scores them in
//! batches with an LLM and serves a ranked, cached digest.
//!
//! ```text
//! sources ──> Collector ──> Enricher ──> Ranker ──> DigestFacade ──> Delivery
//! ```

pub mod collector;
pub mod config;
pub mod delivery;
pub mod digest;
pub mod enrich;
pub mod model;
pub mod rank;
pub mod rate_limit;
pub mod retry;
pub mod source;
pub mod util;

pub use collector::{dedup_articles, Collector};
pub use config::{Config, ConfigError};
pub use delivery::{Delivery, SnapshotWriter};
pub use digest::{DigestError, DigestFacade, DigestState};
pub use enrich::{Enricher, ScoringError, ScoringService};
pub use model::{
    Category, Digest, DigestSummary, EnrichedArticle, OriginKind, RawArticle, Score, Sentiment,
};
pub use rank::{compare_rank, Ranker};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use source::{HttpSourceAdapter, SourceAdapter, SourceDescriptor, SourceFetchError};
