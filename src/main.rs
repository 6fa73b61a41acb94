mod fetch;
mod parser;
mod store;

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use fetch::{fetch_with_retry, PageFetcher, RateLimiter, RetryPolicy};
use store::DetailRecord;

const SEARCH_URL: &str = "https://grants.gov/search-grants";
const MIN_DELAY_MS: u64 = 1000;
const FLUSH_EVERY: usize = 10;

#[derive(Parser)]
#[command(
    name = "grants_scraper",
    about = "grants.gov scraper via a Browserless content endpoint"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the paginated search results into data/grants.csv
    Search {
        /// Max result pages to fetch (default: until an empty page)
        #[arg(short = 'n', long)]
        pages: Option<usize>,
    },
    /// Scrape detail pages for previously collected grants
    Details {
        /// Max grants to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Search + details in one pipeline
    Run {
        /// Max result pages to fetch
        #[arg(long)]
        pages: Option<usize>,
        /// Max grants to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show scraping statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Search { pages } => run_search(pages).await,
        Commands::Details { limit } => run_details(limit).await,
        Commands::Run { pages, limit } => {
            run_search(pages).await?;
            run_details(limit).await
        }
        Commands::Stats => {
            let summaries = store::count_rows(store::SUMMARIES_PATH)?;
            let details = store::count_rows(store::DETAILS_PATH)?;
            println!("Grants:  {}", summaries);
            println!("Details: {}", details);
            println!("Pending: {}", summaries.saturating_sub(details));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Search stage: walk the paginated results until a page parses to zero
/// records (or the page cap), then write all summaries in one pass.
async fn run_search(pages: Option<usize>) -> Result<()> {
    let fetcher = PageFetcher::from_env()?;
    let policy = RetryPolicy::default();
    let mut limiter = RateLimiter::new(Duration::from_millis(MIN_DELAY_MS));

    let mut grants = Vec::new();
    let mut page_num = 1usize;
    loop {
        limiter.wait().await;
        let url = format!("{}?page={}", SEARCH_URL, page_num);
        info!("Scraping search page {}", page_num);
        let html = fetch_with_retry(&fetcher, &policy, &url).await?;

        let page_grants = parser::parse_search_results(&html);
        if page_grants.is_empty() {
            info!("No grants on page {} - reached end of results", page_num);
            break;
        }
        grants.extend(page_grants);

        if pages.is_some_and(|max| page_num >= max) {
            break;
        }
        page_num += 1;
    }

    println!("Collected {} grants", grants.len());
    store::write_summaries(store::SUMMARIES_PATH, &grants)?;
    Ok(())
}

/// Details stage: fetch each collected grant's detail page, parse it, and
/// rewrite the details file every few records so a crash loses little.
async fn run_details(limit: Option<usize>) -> Result<()> {
    let fetcher = PageFetcher::from_env()?;
    let policy = RetryPolicy::default();
    let mut limiter = RateLimiter::new(Duration::from_millis(MIN_DELAY_MS));

    let mut grants = store::load_summaries(store::SUMMARIES_PATH)?;
    if let Some(n) = limit {
        grants.truncate(n);
    }
    if grants.is_empty() {
        println!("No grants to process. Run 'search' first.");
        return Ok(());
    }

    println!("Scraping {} detail pages...", grants.len());
    let pb = ProgressBar::new(grants.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut records = Vec::new();
    let mut errors = 0usize;
    for grant in &grants {
        limiter.wait().await;
        let html = match fetch_with_retry(&fetcher, &policy, &grant.detail_page_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Error scraping {}: {}", grant.opportunity_number, e);
                errors += 1;
                pb.inc(1);
                continue;
            }
        };

        let fields = parser::parse_grant_details(&html);
        records.push(DetailRecord {
            opportunity_number: grant.opportunity_number.clone(),
            detail_page_url: grant.detail_page_url.clone(),
            fields,
        });

        // Periodic save so a long run loses at most a few pages.
        if records.len() % FLUSH_EVERY == 0 {
            store::write_details(store::DETAILS_PATH, &records)?;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    store::write_details(store::DETAILS_PATH, &records)?;
    println!(
        "Done: {} detail pages ({} ok, {} errors).",
        grants.len(),
        records.len(),
        errors
    );
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
