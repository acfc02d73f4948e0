use anyhow::{Context, Result};
use clap::Parser;
use newsdigest::config::Config;
use newsdigest::delivery::{Delivery, SnapshotWriter};
use newsdigest::model::{Category, Digest, EnrichedArticle};
use newsdigest::source::HttpSourceAdapter;
use newsdigest::{DigestError, DigestFacade, SourceAdapter, ScoringService};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "newsdigest",
    about = "Collects, scores and ranks tech news into a digest"
)]
struct Args {
    /// Config file (default: ~/.config/newsdigest/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Rebuild even if the cached digest is still fresh
    #[arg(long)]
    refresh: bool,

    /// Keep running, rebuilding every `refresh_interval_minutes`
    #[arg(long)]
    watch: bool,

    /// Write latest.json and a dated snapshot into this directory
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Only print articles matching this text
    #[arg(long)]
    search: Option<String>,

    /// Only print articles in this category (e.g. "AI/ML", "Science")
    #[arg(long)]
    category: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load(&path).context("Failed to load config")?,
            None => Config::default(),
        },
    };

    let adapter = HttpSourceAdapter::new(config.source_limits())
        .context("Failed to build HTTP client")?;
    let scorer = config
        .build_scorer(reqwest::Client::new())
        .context("Invalid scoring configuration")?;
    let facade = DigestFacade::from_config(adapter, scorer, &config);
    let delivery = args.output.as_ref().map(SnapshotWriter::new);

    if !args.watch {
        return run_once(&facade, &args, delivery.as_ref(), args.refresh).await;
    }

    let interval = config.refresh_interval().max(std::time::Duration::from_secs(60));
    let mut ticker = tokio::time::interval(interval);
    let mut first = true;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Every tick after the first is a scheduled rebuild
                let force = args.refresh || !first;
                first = false;
                if let Err(e) = run_once(&facade, &args, delivery.as_ref(), force).await {
                    tracing::error!(error = %e, "Digest run failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        }
    }
}

async fn run_once<A, S>(
    facade: &DigestFacade<A, S>,
    args: &Args,
    delivery: Option<&SnapshotWriter>,
    force: bool,
) -> Result<()>
where
    A: SourceAdapter,
    S: ScoringService,
{
    let digest = match facade.get_digest(force).await {
        Ok(digest) => digest,
        Err(DigestError::NoArticlesAvailable) => {
            eprintln!("No articles available from any source.");
            return Ok(());
        }
    };

    if let Some(writer) = delivery {
        writer.deliver(&digest).await?;
    }

    print_digest(&digest, args);
    Ok(())
}

fn print_digest(digest: &Arc<Digest>, args: &Args) {
    let mut items: Vec<&EnrichedArticle> = match &args.category {
        Some(category) => digest.in_category(Category::parse_lenient(category)),
        None => digest.items.iter().collect(),
    };
    if let Some(query) = &args.search {
        let matches = digest.search(query);
        items.retain(|a| matches.iter().any(|m| std::ptr::eq(*m, *a)));
    }

    let summary = digest.summary();
    println!(
        "{} articles from {} sources, avg relevance {:.1}/10 ({})",
        summary.total_articles,
        digest.source_count,
        summary.avg_relevance / 10.0,
        digest.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!();

    for (i, article) in items.iter().enumerate() {
        println!(
            "{:>2}. [{:.1}] {} ({}, {})",
            i + 1,
            article.relevance_score.to_ten_scale(),
            article.title(),
            article.source(),
            article.category
        );
        println!("    {}", article.url());
        for point in &article.key_points {
            println!("    - {point}");
        }
    }

    if items.is_empty() {
        println!("No matching articles.");
    }
}
