use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::info;

use crate::config::Config;
use crate::db::Store;
use crate::error::Result;

use super::feed::FeedSource;
use super::newsapi::NewsApiClient;

/// Results of a collection run.
#[derive(Debug, Default)]
pub struct CollectResult {
    pub total_found: usize,
    pub new_articles: usize,
    pub duplicates: usize,
    pub sources: HashMap<String, usize>,
}

/// A candidate article from any source, before persistence.
struct Candidate {
    url: String,
    title: String,
    source: Option<String>,
    published_date: Option<String>,
    content: Option<String>,
}

/// Gathers candidate articles from RSS feeds and the news-search API and
/// persists them under the period.
pub struct Collector<'a> {
    store: &'a Store,
    feed_source: Option<FeedSource>,
    news_client: Option<NewsApiClient>,
    news_query: String,
    days_back: i64,
}

impl<'a> Collector<'a> {
    pub fn new(cfg: &Config, store: &'a Store, days_back: i64) -> Self {
        let feed_source = if cfg.sources.feeds.is_empty() {
            None
        } else {
            Some(FeedSource::new(cfg.sources.feeds.clone()))
        };

        let api_cfg = &cfg.sources.apis.newsapi;
        let (news_client, news_query) = if api_cfg.enabled {
            (
                Some(NewsApiClient::new(&api_cfg.api_key_env)),
                api_cfg.query.clone(),
            )
        } else {
            (None, String::new())
        };

        Self {
            store,
            feed_source,
            news_client,
            news_query,
            days_back,
        }
    }

    /// Collects from all configured sources, de-duplicates by URL, and
    /// persists with the given period. Source failures never fail the stage.
    pub async fn collect(&self, period_id: &str) -> Result<CollectResult> {
        let mut result = CollectResult::default();
        let mut candidates: Vec<Candidate> = Vec::new();

        if let Some(feed_source) = &self.feed_source {
            info!("collecting from RSS feeds...");
            let cutoff = cutoff_date(self.days_back);
            for entry in feed_source.parse_all(cutoff).await {
                candidates.push(Candidate {
                    url: entry.url,
                    title: entry.title,
                    source: Some(entry.source),
                    published_date: entry.published_date,
                    content: entry.content,
                });
            }
        }

        if let Some(news_client) = &self.news_client {
            if news_client.is_configured() {
                info!("collecting from news API...");

                let priorities = self.store.active_priorities().await?;
                let priority_titles: Vec<String> =
                    priorities.into_iter().map(|p| p.title).collect();

                let articles = if priority_titles.is_empty() {
                    news_client.search(&self.news_query, self.days_back, 100).await
                } else {
                    info!("using {} active priorities for search", priority_titles.len());
                    news_client
                        .search_with_priorities(&self.news_query, &priority_titles, self.days_back)
                        .await
                };

                for article in articles {
                    candidates.push(Candidate {
                        url: article.url,
                        title: article.title,
                        source: Some(article.source),
                        published_date: article.published_date,
                        content: article.content,
                    });
                }
            }
        }

        result.total_found = candidates.len();

        // URL dedup across all sources, then persist; the store turns
        // already-known URLs into the 0 sentinel.
        let mut seen = HashSet::new();
        for candidate in candidates {
            if !seen.insert(candidate.url.clone()) {
                result.duplicates += 1;
                continue;
            }

            let source_name = candidate.source.clone().unwrap_or_default();
            let id = self
                .store
                .insert_article(
                    candidate.url,
                    candidate.title,
                    candidate.source,
                    candidate.published_date,
                    candidate.content,
                    period_id.to_string(),
                )
                .await?;

            if id > 0 {
                result.new_articles += 1;
                *result.sources.entry(source_name).or_insert(0) += 1;
            } else {
                result.duplicates += 1;
            }
        }

        info!(
            "collection complete: {} found, {} new, {} duplicates",
            result.total_found, result.new_articles, result.duplicates
        );
        Ok(result)
    }
}

fn cutoff_date(days_back: i64) -> NaiveDate {
    chrono::Local::now().date_naive() - chrono::Duration::days(days_back)
}
