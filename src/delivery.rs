//! Hand-off of finished digests to outside consumers.
//!
//! Formatting (email, chat, dashboards) belongs to the consumer; the core only
//! passes the [`Digest`] value along. [`SnapshotWriter`] also keeps the dated
//! snapshots it writes and aggregates them into `dashboard_data.json`.

use crate::model::{Category, Digest, DigestSummary, EnrichedArticle};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Articles carried over from `latest.json` into the dashboard file.
const DASHBOARD_ARTICLES: usize = 20;

/// Sources listed in the trend distribution.
const TOP_SOURCES: usize = 15;

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, digest: &Digest) -> Result<()>;
}

/// Dashboard data shape: one digest plus its summary.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub date: DateTime<Utc>,
    pub articles: &'a [EnrichedArticle],
    pub summary: DigestSummary,
}

impl<'a> Snapshot<'a> {
    pub fn new(digest: &'a Digest) -> Self {
        Self {
            date: digest.generated_at,
            articles: &digest.items,
            summary: digest.summary(),
        }
    }
}

// ============================================================================
// History and Trends
// ============================================================================

/// The parts of a stored dated snapshot the trend report reads.
///
/// Missing fields default, so older or hand-edited files still load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredSnapshot {
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub articles: Vec<StoredArticle>,
    #[serde(default)]
    pub summary: StoredSummary,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredArticle {
    #[serde(default)]
    pub category: Category,
    #[serde(default = "unknown_source")]
    pub source: String,
}

fn unknown_source() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoredSummary {
    pub total_articles: usize,
    pub avg_relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRelevance {
    pub date: NaiveDate,
    pub avg_relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
}

/// Day-by-day aggregates over the stored snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trends {
    pub daily_counts: Vec<DailyCount>,
    pub relevance_trend: Vec<DailyRelevance>,
    pub category_distribution: BTreeMap<Category, usize>,
    /// Most frequent sources first, ties by name
    pub source_distribution: Vec<SourceCount>,
}

impl Trends {
    /// `history` is expected in date order, as [`SnapshotWriter::load_history`] returns it.
    pub fn from_history(history: &[StoredSnapshot]) -> Self {
        let mut trends = Self::default();
        let mut sources: HashMap<&str, usize> = HashMap::new();

        for day in history {
            let date = day.date.date_naive();
            trends.daily_counts.push(DailyCount {
                date,
                count: day.summary.total_articles,
            });
            trends.relevance_trend.push(DailyRelevance {
                date,
                avg_relevance: (day.summary.avg_relevance * 10.0).round() / 10.0,
            });
            for article in &day.articles {
                *trends.category_distribution.entry(article.category).or_insert(0) += 1;
                *sources.entry(article.source.as_str()).or_insert(0) += 1;
            }
        }

        let mut sources: Vec<SourceCount> = sources
            .into_iter()
            .map(|(source, count)| SourceCount {
                source: source.to_string(),
                count,
            })
            .collect();
        sources.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.source.cmp(&b.source)));
        sources.truncate(TOP_SOURCES);
        trends.source_distribution = sources;
        trends
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalSummary {
    pub total_days: usize,
    pub total_articles_collected: usize,
    pub date_range: DateRange,
}

impl HistoricalSummary {
    pub fn from_history(history: &[StoredSnapshot]) -> Self {
        Self {
            total_days: history.len(),
            total_articles_collected: history.iter().map(|d| d.summary.total_articles).sum(),
            date_range: DateRange {
                start: history.first().map(|d| d.date),
                end: history.last().map(|d| d.date),
            },
        }
    }
}

/// Contents of `dashboard_data.json`.
#[derive(Debug, Serialize)]
pub struct Dashboard<'a> {
    pub last_updated: DateTime<Utc>,
    pub latest_articles: &'a [EnrichedArticle],
    pub summary: DigestSummary,
    pub trends: Trends,
    pub historical_summary: HistoricalSummary,
}

// ============================================================================
// Snapshot Writer
// ============================================================================

/// Writes `latest.json`, `articles_YYYYMMDD.json` and `dashboard_data.json`
/// into a directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join("latest.json")
    }

    pub fn daily_path(&self, date: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("articles_{}.json", date.format("%Y%m%d")))
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.dir.join("dashboard_data.json")
    }

    /// Reads every `articles_*.json` snapshot in the directory, sorted by date.
    ///
    /// Unreadable or unparsable files are skipped with a warning. A missing
    /// directory yields an empty history.
    pub fn load_history(&self) -> Result<Vec<StoredSnapshot>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to list snapshot directory '{}'", self.dir.display())
                })
            }
        };

        let mut history = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("articles_") && name.ends_with(".json")) {
                continue;
            }
            let path = entry.path();
            let parsed = std::fs::read(&path)
                .map_err(anyhow::Error::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<StoredSnapshot>(&bytes)?));
            match parsed {
                Ok(snapshot) => history.push(snapshot),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot");
                }
            }
        }

        history.sort_by_key(|s| s.date);
        Ok(history)
    }

    fn write_files(&self, digest: &Digest, snapshot: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create output directory '{}'", self.dir.display())
        })?;
        write_atomic(&self.daily_path(digest.generated_at), snapshot)?;
        write_atomic(&self.latest_path(), snapshot)?;

        let history = self.load_history()?;
        let dashboard = Dashboard {
            last_updated: Utc::now(),
            latest_articles: &digest.items[..digest.items.len().min(DASHBOARD_ARTICLES)],
            summary: digest.summary(),
            trends: Trends::from_history(&history),
            historical_summary: HistoricalSummary::from_history(&history),
        };
        let json = serde_json::to_vec_pretty(&dashboard)
            .context("Failed to serialize dashboard data")?;
        write_atomic(&self.dashboard_path(), &json)
    }
}

#[async_trait]
impl Delivery for SnapshotWriter {
    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let json = serde_json::to_vec_pretty(&Snapshot::new(digest))
            .context("Failed to serialize digest snapshot")?;

        let writer = self.clone();
        let owned_digest = digest.clone();
        tokio::task::spawn_blocking(move || writer.write_files(&owned_digest, &json))
            .await
            .context("Snapshot writer task panicked")??;

        tracing::info!(
            path = %self.latest_path().display(),
            articles = digest.len(),
            "Wrote digest snapshot"
        );
        Ok(())
    }
}

/// Write-to-temp-then-rename, so readers never see a partial file.
fn write_atomic(dst: &Path, content: &[u8]) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // Fails if the path exists, so a planted symlink is never followed
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions or disk space",
                temp_path.display()
            )
        })?;

    temp_file.write_all(content).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to write to temporary file '{}': disk may be full",
            temp_path.display()
        )
    })?;

    temp_file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to sync temporary file '{}'", temp_path.display())
    })?;
    drop(temp_file);

    // On Windows, rename fails if destination exists
    #[cfg(windows)]
    if dst.exists() {
        std::fs::remove_file(dst).with_context(|| {
            let _ = std::fs::remove_file(&temp_path);
            format!("Failed to remove existing '{}'", dst.display())
        })?;
    }

    std::fs::rename(&temp_path, dst).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}': check permissions",
            temp_path.display(),
            dst.display()
        )
    })?;

    Ok(())
}
