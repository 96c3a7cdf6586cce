use std::time::Duration;

use chrono::NaiveDate;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{info, warn};

use crate::config;

const MAX_PER_FEED: usize = 20;
const MAX_CONCURRENT_FEEDS: usize = 5;

/// A normalized entry pulled from an RSS/Atom feed.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub url: String,
    pub title: String,
    pub published_date: Option<String>, // YYYY-MM-DD
    pub content: Option<String>,
    pub source: String,
}

/// Fetches and parses the configured RSS/Atom feeds.
pub struct FeedSource {
    feeds: Vec<config::Feed>,
    client: Client,
}

impl FeedSource {
    pub fn new(feeds: Vec<config::Feed>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("aicrawler/1.0 (news aggregator)")
            .build()
            .expect("Failed to create HTTP client");
        Self { feeds, client }
    }

    /// Fetches all feeds concurrently and returns entries published within
    /// the lookback window. A failing feed logs and contributes nothing.
    pub async fn parse_all(&self, cutoff: NaiveDate) -> Vec<FeedEntry> {
        let results: Vec<Vec<FeedEntry>> = stream::iter(&self.feeds)
            .map(|feed| async move {
                let name = if feed.name.is_empty() {
                    extract_source_name(&feed.url)
                } else {
                    feed.name.clone()
                };

                match self.parse_feed(&feed.url, &name, cutoff).await {
                    Ok(entries) => {
                        info!("parsed {} entries from {}", entries.len(), name);
                        entries
                    }
                    Err(e) => {
                        warn!("failed to parse feed {}: {}", feed.url, e);
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FEEDS)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }

    async fn parse_feed(
        &self,
        feed_url: &str,
        source_name: &str,
        cutoff: NaiveDate,
    ) -> anyhow::Result<Vec<FeedEntry>> {
        let response = self.client.get(feed_url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status());
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        let mut entries = Vec::new();
        for item in feed.entries {
            if entries.len() >= MAX_PER_FEED {
                break;
            }
            let Some(entry) = parse_item(item, source_name) else {
                continue;
            };
            if is_within_window(entry.published_date.as_deref(), cutoff) {
                entries.push(entry);
            }
        }

        Ok(entries)
    }
}

fn parse_item(item: feed_rs::model::Entry, source: &str) -> Option<FeedEntry> {
    let url = item
        .links
        .first()
        .map(|l| l.href.clone())
        .filter(|href| !href.is_empty())
        .or_else(|| {
            // Fall back to the entry id (guid) when no link is given.
            if item.id.is_empty() {
                None
            } else {
                Some(item.id.clone())
            }
        })?;

    let title = item.title.map(|t| t.content.trim().to_string())?;
    if title.is_empty() {
        return None;
    }

    let published_date = item
        .published
        .or(item.updated)
        .map(|dt| dt.format("%Y-%m-%d").to_string());

    let content_html = item
        .content
        .and_then(|c| c.body)
        .or(item.summary.map(|s| s.content));
    let content = content_html.and_then(|html| html_to_text(&html));

    Some(FeedEntry {
        url,
        title,
        published_date,
        content,
        source: source.to_string(),
    })
}

/// Entries without a parseable date get the benefit of the doubt.
fn is_within_window(published_date: Option<&str>, cutoff: NaiveDate) -> bool {
    let Some(date) = published_date else {
        return true;
    };
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(published) => published >= cutoff,
        Err(_) => true,
    }
}

fn html_to_text(html: &str) -> Option<String> {
    let text = html2text::from_read(html.as_bytes(), 80);
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Derives a display name from a feed URL host, e.g.
/// "https://blog.rust-lang.org/feed.xml" -> "Rust-lang".
fn extract_source_name(feed_url: &str) -> String {
    let Ok(parsed) = url::Url::parse(feed_url) else {
        return feed_url.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return feed_url.to_string();
    };

    let mut host = host.to_lowercase();
    for prefix in ["www.", "blog.", "blogs.", "rss.", "feeds."] {
        if let Some(stripped) = host.strip_prefix(prefix) {
            host = stripped.to_string();
        }
    }

    let parts: Vec<&str> = host.split('.').collect();
    let name = if parts.len() >= 2 {
        parts[parts.len() - 2]
    } else {
        &host
    };

    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => host,
    }
}
