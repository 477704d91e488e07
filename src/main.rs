mod db;
mod dispatch;
mod fetcher;
mod parser;
mod settings;
mod sitemap;
mod tracker;

use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use dispatch::AutoTracker;
use settings::Settings;
use tracker::{SqliteTracker, StdoutTracker, Tracker};

#[derive(Parser)]
#[command(name = "ld_tracker", about = "Track JSON-LD posts and products found in web pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a sitemap and populate the page queue
    Init {
        /// Sitemap URL (urlset)
        #[arg(long = "sitemap")]
        sitemap_url: String,
        /// Only queue URLs matching this regex
        #[arg(short, long)]
        pattern: Option<String>,
    },
    /// Fetch queued pages and store tracked events
    Crawl {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Scan local HTML files
    Scan {
        files: Vec<PathBuf>,
        /// Page URL to report (default: the file path)
        #[arg(long)]
        url: Option<String>,
        /// Store events in the database instead of printing them
        #[arg(long)]
        store: bool,
    },
    /// Fetch one URL and print its tracked events
    Fetch { url: String },
    /// Re-fetch a URL periodically, tracking entities that appear over time
    Watch {
        url: String,
        /// Seconds between fetches
        #[arg(short, long, default_value = "30")]
        interval: u64,
        /// Number of fetches (default: until interrupted)
        #[arg(short = 'n', long)]
        rounds: Option<usize>,
    },
    /// Normalize one JSON-LD blob read from stdin
    Extract,
    /// Show page and event counters
    Stats,
    /// List stored events
    Events {
        /// Filter by event type (postViewed, productViewed)
        #[arg(short = 't', long = "type")]
        event_type: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(?settings, "configuration loaded");

    let result = match cli.command {
        Commands::Init { sitemap_url, pattern } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let client = fetcher::build_client(&settings)?;
            let urls = sitemap::fetch_page_urls(&client, &sitemap_url, pattern.as_deref()).await?;
            let inserted = db::insert_pages(&conn, &urls)?;
            println!("Inserted {} new page URLs ({} total found)", inserted, urls.len());
            Ok(())
        }
        Commands::Crawl { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first or all pages are crawled.");
                return Ok(());
            }

            println!("Crawling {} pages...", pages.len());
            let mut auto = AutoTracker::new(SqliteTracker::new(&conn));
            let mut tracked = 0usize;
            let stats = fetcher::fetch_pages_streaming(&settings, pages, |row| {
                if let Some(html) = &row.html {
                    auto.navigate(&row.url);
                    tracked += auto.scan(html);
                }
                db::mark_visited(&conn, &row)
            })
            .await?;
            println!(
                "Done: {} fetched ({} ok, {} errors), {} events tracked.",
                stats.total, stats.ok, stats.errors, tracked
            );
            Ok(())
        }
        Commands::Scan { files, url, store } => {
            if files.is_empty() {
                println!("No files given.");
                return Ok(());
            }
            let tracked = if store {
                let conn = db::connect(&settings.db_path)?;
                db::init_schema(&conn)?;
                scan_files(&files, url.as_deref(), SqliteTracker::new(&conn))?
            } else {
                scan_files(&files, url.as_deref(), StdoutTracker::stdout())?
            };
            info!("Tracked {} events from {} files", tracked, files.len());
            Ok(())
        }
        Commands::Fetch { url } => {
            let html = fetcher::fetch_single_page(&settings, &url).await?;
            let mut auto = AutoTracker::new(StdoutTracker::stdout());
            auto.navigate(&url);
            let tracked = auto.scan(&html);
            info!("Tracked {} events from {}", tracked, url);
            Ok(())
        }
        Commands::Watch { url, interval, rounds } => {
            let mut auto = AutoTracker::new(StdoutTracker::stdout());
            auto.navigate(&url);
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval.max(1)));
            let mut round = 0usize;
            while rounds.map_or(true, |n| round < n) {
                ticker.tick().await;
                round += 1;
                match fetcher::fetch_single_page(&settings, &url).await {
                    Ok(html) => {
                        auto.request_scan();
                        if let Some(tracked) = auto.flush(&html) {
                            info!(round, tracked, "scan complete");
                        }
                    }
                    Err(e) => warn!(round, "fetch failed: {:#}", e),
                }
            }
            Ok(())
        }
        Commands::Extract => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            let entity = parser::extract_script(&input);
            println!("{}", serde_json::to_string_pretty(&entity)?);
            Ok(())
        }
        Commands::Events { event_type, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_events(&conn, event_type.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No events found.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<13} | {:<24} | {:<40} | {:<19}",
                "#", "Event", "Entity", "Page", "Tracked"
            );
            println!("{}", "-".repeat(113));
            for r in &rows {
                println!(
                    "{:>5} | {:<13} | {:<24} | {:<40} | {:<19}",
                    r.id,
                    r.event_type,
                    truncate(&r.entity_id, 24),
                    truncate(&r.page_url, 40),
                    r.tracked_at
                );
            }
            println!("\n{} events", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Pages:     {}", s.pages);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Errors:    {}", s.errors);
            println!("Events:    {}", s.events);
            println!("  posts:    {}", s.posts);
            println!("  products: {}", s.products);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Extract every file in parallel, then dispatch in input order so each
/// file is its own page view.
fn scan_files<T: Tracker>(
    files: &[PathBuf],
    url: Option<&str>,
    tracker: T,
) -> anyhow::Result<usize> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let extracted = files
        .par_iter()
        .map(|path| {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let entities = parser::process_document(&html);
            pb.inc(1);
            Ok((path, entities))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    pb.finish_and_clear();

    let mut auto = AutoTracker::new(tracker);
    let mut tracked = 0;
    for (path, entities) in extracted {
        let page = url
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        auto.navigate(&page);
        tracked += auto.dispatch(entities);
    }
    Ok(tracked)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
