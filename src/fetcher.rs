use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::FetchRow;
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(s) => *s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error(),
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
        }
    }

    fn status(&self) -> Option<i32> {
        match self {
            FetchError::Status(s) => Some(s.as_u16() as i32),
            FetchError::Request(e) => e.status().map(|s| s.as_u16() as i32),
        }
    }
}

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub fn build_client(settings: &Settings) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.request_timeout())
        .build()?)
}

/// Fetch pages concurrently and hand each result to `on_page` as it arrives.
/// `on_page` runs on the caller's task only, one page at a time.
pub async fn fetch_pages_streaming<F>(
    settings: &Settings,
    pages: Vec<(i64, String)>,
    mut on_page: F,
) -> Result<FetchStats>
where
    F: FnMut(FetchRow) -> Result<()>,
{
    let client = build_client(settings)?;
    let semaphore = Arc::new(Semaphore::new(settings.concurrency));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, this loop consumes them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(settings.concurrency * 2);

    for (page_id, url) in pages {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let retries = settings.max_retries;
        let backoff_ms = settings.base_backoff_ms;

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetch_with_retry(&client, page_id, &url, retries, backoff_ms).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }
        on_page(row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

async fn fetch_with_retry(
    client: &reqwest::Client,
    page_id: i64,
    url: &str,
    max_retries: u32,
    base_backoff_ms: u64,
) -> FetchRow {
    let mut attempt = 0;
    loop {
        let start = Instant::now();
        let result = fetch_one(client, url).await;
        let latency_ms = Some(start.elapsed().as_millis() as i64);

        match result {
            Ok((status, html)) => {
                return FetchRow {
                    page_id,
                    url: url.to_string(),
                    html: Some(html),
                    status: Some(status),
                    error: None,
                    latency_ms,
                }
            }
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let backoff = Duration::from_millis(base_backoff_ms * 2u64.pow(attempt));
                warn!(
                    "{} on {} (attempt {}/{}), backing off {:.1}s",
                    e,
                    url,
                    attempt + 1,
                    max_retries,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("Fetch failed for {}: {}", url, e);
                return FetchRow {
                    page_id,
                    url: url.to_string(),
                    html: None,
                    status: e.status(),
                    error: Some(e.to_string()),
                    latency_ms,
                };
            }
        }
    }
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> Result<(i32, String), FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    let html = response.text().await?;
    Ok((status.as_u16() as i32, html))
}

/// Fetch a single URL and return its body.
pub async fn fetch_single_page(settings: &Settings, url: &str) -> Result<String> {
    let client = build_client(settings)?;
    let (_, html) = fetch_one(&client, url).await?;
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy() {
        assert!(FetchError::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(FetchError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!FetchError::Status(StatusCode::NOT_FOUND).is_retryable());
        assert_eq!(FetchError::Status(StatusCode::NOT_FOUND).status(), Some(404));
    }

    #[tokio::test]
    async fn empty_queue_finishes() {
        let settings = Settings::default();
        let mut seen = 0;
        let stats = fetch_pages_streaming(&settings, Vec::new(), |_| {
            seen += 1;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!((stats.total, stats.ok, stats.errors), (0, 0, 0));
        assert_eq!(seen, 0);
    }
}
