use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

/// Fetch a sitemap and return its page URLs, optionally filtered by `pattern`.
pub async fn fetch_page_urls(
    client: &reqwest::Client,
    sitemap_url: &str,
    pattern: Option<&str>,
) -> Result<Vec<String>> {
    let re = pattern.map(Regex::new).transpose().context("Invalid URL pattern")?;

    info!("Fetching sitemap: {}", sitemap_url);
    let xml = client
        .get(sitemap_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch sitemap")?;

    let all_urls = parse_urlset(&xml)?;
    info!("Total URLs in sitemap: {}", all_urls.len());

    let filtered = filter_urls(all_urls, re.as_ref());
    info!("Pages after filtering: {}", filtered.len());
    Ok(filtered)
}

fn filter_urls(urls: Vec<String>, re: Option<&Regex>) -> Vec<String> {
    match re {
        Some(re) => urls.into_iter().filter(|u| re.is_match(u)).collect(),
        None => urls,
    }
}

/// Parse a urlset XML and return all <loc> URLs.
fn parse_urlset(xml: &str) -> Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut urls = Vec::new();
    let mut in_url = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"url" => in_url = true,
                b"loc" if in_url => in_loc = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(e)) if in_loc => {
                let loc = e.unescape()?;
                let loc = loc.trim();
                if !loc.is_empty() {
                    urls.push(loc.to_string());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"url" => in_url = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(urls)
}
