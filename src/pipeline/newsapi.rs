use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Local};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

const NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2/everything";
const MAX_PAGE_SIZE: usize = 100;
const EXPANSION_PAGE_SIZE: usize = 50;

/// An article returned by the news-search API.
#[derive(Debug, Clone)]
pub struct NewsArticle {
    pub url: String,
    pub title: String,
    pub published_date: Option<String>,
    pub content: Option<String>,
    pub source: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "publishedAt", default)]
    published_at: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: RawSource,
}

#[derive(Debug, Deserialize, Default)]
struct RawSource {
    #[serde(default)]
    name: String,
}

/// Client for the news-search API.
pub struct NewsApiClient {
    api_key: String,
    client: Client,
}

impl NewsApiClient {
    pub fn new(api_key_env: &str) -> Self {
        Self {
            api_key: std::env::var(api_key_env).unwrap_or_default(),
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Searches for articles matching a query. Failures log and return
    /// nothing; a broken source never fails the stage.
    pub async fn search(&self, query: &str, days_back: i64, page_size: usize) -> Vec<NewsArticle> {
        if self.api_key.is_empty() {
            info!("news API not configured, skipping search");
            return Vec::new();
        }

        let now = Local::now();
        let from_date = (now - chrono::Duration::days(days_back))
            .format("%Y-%m-%d")
            .to_string();
        let to_date = now.format("%Y-%m-%d").to_string();
        let page_size = page_size.min(MAX_PAGE_SIZE);

        let response = self
            .client
            .get(NEWSAPI_BASE_URL)
            .query(&[
                ("q", query),
                ("from", &from_date),
                ("to", &to_date),
                ("language", "en"),
                ("pageSize", &page_size.to_string()),
                ("sortBy", "relevancy"),
            ])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("news API error: {}", e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!("news API HTTP error: {}", response.status());
            return Vec::new();
        }

        let result: SearchResponse = match response.json().await {
            Ok(r) => r,
            Err(e) => {
                warn!("news API decode error: {}", e);
                return Vec::new();
            }
        };

        if result.status != "ok" {
            warn!("news API status: {}", result.status);
            return Vec::new();
        }

        let articles: Vec<NewsArticle> = result
            .articles
            .into_iter()
            .filter_map(normalize_article)
            .collect();

        info!("fetched {} articles from news API for query: {}", articles.len(), query);
        articles
    }

    /// Runs the base query at full page size plus one page-limited query per
    /// active priority, de-duplicated by URL.
    pub async fn search_with_priorities(
        &self,
        base_query: &str,
        priorities: &[String],
        days_back: i64,
    ) -> Vec<NewsArticle> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();

        for article in self.search(base_query, days_back, MAX_PAGE_SIZE).await {
            if seen.insert(article.url.clone()) {
                all.push(article);
            }
        }

        for priority in priorities {
            let query = format!("{} {}", base_query, priority);
            for article in self.search(&query, days_back, EXPANSION_PAGE_SIZE).await {
                if seen.insert(article.url.clone()) {
                    all.push(article);
                }
            }
        }

        all
    }
}

fn normalize_article(raw: RawArticle) -> Option<NewsArticle> {
    if raw.url.is_empty() || raw.title.is_empty() {
        return None;
    }
    // The API tombstones withdrawn articles instead of omitting them.
    if raw.title == "[Removed]" || raw.url == "https://removed.com" {
        return None;
    }

    let published_date = DateTime::parse_from_rfc3339(&raw.published_at)
        .ok()
        .map(|dt| dt.format("%Y-%m-%d").to_string());

    let content = raw
        .content
        .filter(|c| !c.trim().is_empty())
        .or(raw.description)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let source = if raw.source.name.is_empty() {
        "NewsAPI".to_string()
    } else {
        raw.source.name
    };

    Some(NewsArticle {
        url: raw.url,
        title: raw.title.trim().to_string(),
        published_date,
        content,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str, title: &str) -> RawArticle {
        RawArticle {
            url: url.to_string(),
            title: title.to_string(),
            published_at: String::new(),
            content: None,
            description: None,
            source: RawSource::default(),
        }
    }

    #[test]
    fn normalize_drops_empty_and_removed() {
        assert!(normalize_article(raw("", "Title")).is_none());
        assert!(normalize_article(raw("https://a.com", "")).is_none());
        assert!(normalize_article(raw("https://a.com", "[Removed]")).is_none());
        assert!(normalize_article(raw("https://removed.com", "Gone")).is_none());
    }

    #[test]
    fn normalize_parses_published_date() {
        let mut article = raw("https://a.com", "Title");
        article.published_at = "2026-02-06T11:30:00Z".to_string();
        let normalized = normalize_article(article).unwrap();
        assert_eq!(normalized.published_date.as_deref(), Some("2026-02-06"));
    }

    #[test]
    fn normalize_falls_back_to_description() {
        let mut article = raw("https://a.com", "Title");
        article.content = Some("   ".to_string());
        article.description = Some("A description".to_string());
        let normalized = normalize_article(article).unwrap();
        assert_eq!(normalized.content.as_deref(), Some("A description"));
    }

    #[test]
    fn normalize_defaults_source_name() {
        let normalized = normalize_article(raw("https://a.com", "Title")).unwrap();
        assert_eq!(normalized.source, "NewsAPI");
    }
}
