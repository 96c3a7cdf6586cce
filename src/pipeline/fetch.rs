use std::collections::HashSet;
use std::time::Duration;

use reqwest::{redirect, Client};
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::error::Result;

const USER_AGENT_STRING: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_REDIRECTS: usize = 10;
const MIN_CONTENT_LEN: usize = 100;

/// Results of a content-fetch run.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub fetched: usize,
    pub failed: usize,
}

enum FetchOutcome {
    /// Extracted article text (already length-gated).
    Content(String),
    /// Transport failure or nothing extractable; marks this article only.
    Empty,
    /// HTTP status >= 400; trips the per-domain breaker.
    HttpError(u16),
}

/// Completes articles whose feed entry carried no body, via HTTP fetch and
/// text extraction.
pub struct ContentFetcher<'a> {
    store: &'a Store,
    client: Client,
}

impl<'a> ContentFetcher<'a> {
    pub fn new(store: &'a Store) -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT_STRING)
            .build()
            .expect("Failed to create HTTP client");
        Self { store, client }
    }

    /// Fetches content for every article still missing a body. Domains that
    /// answer with an HTTP error are skipped for the rest of the run.
    pub async fn fetch_missing_content(&self, period_id: Option<String>) -> Result<FetchResult> {
        let articles = self.store.articles_needing_fetch(period_id).await?;

        if articles.is_empty() {
            info!("no articles need content fetching");
            return Ok(FetchResult::default());
        }

        let mut result = FetchResult::default();
        let mut failed_domains: HashSet<String> = HashSet::new();

        for article in articles {
            let domain = url::Url::parse(&article.url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
                .unwrap_or_default();

            if failed_domains.contains(&domain) {
                self.store.mark_article_fetch_attempted(article.id).await?;
                result.failed += 1;
                continue;
            }

            match self.fetch_article_content(&article.url).await {
                FetchOutcome::Content(content) => {
                    self.store.update_article_content(article.id, content).await?;
                    result.fetched += 1;
                    info!("fetched content for: {}", article.title);
                }
                FetchOutcome::Empty => {
                    self.store.mark_article_fetch_attempted(article.id).await?;
                    result.failed += 1;
                    debug!("no extractable content from: {}", article.url);
                }
                FetchOutcome::HttpError(status) => {
                    self.store.mark_article_fetch_attempted(article.id).await?;
                    result.failed += 1;
                    if !domain.is_empty() {
                        failed_domains.insert(domain.clone());
                    }
                    warn!(
                        "HTTP {} for {} - skipping remaining from {}",
                        status, article.url, domain
                    );
                }
            }
        }

        info!(
            "content fetch complete: {} fetched, {} failed",
            result.fetched, result.failed
        );
        Ok(result)
    }

    async fn fetch_article_content(&self, article_url: &str) -> FetchOutcome {
        let response = match self.client.get(article_url).send().await {
            Ok(r) => r,
            // Connection-level failure, not an HTTP error.
            Err(_) => return FetchOutcome::Empty,
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            return FetchOutcome::HttpError(status.as_u16());
        }

        let html = match response.text().await {
            Ok(body) => body,
            Err(_) => return FetchOutcome::Empty,
        };

        match extract_content(&html) {
            Some(text) => FetchOutcome::Content(text),
            None => FetchOutcome::Empty,
        }
    }
}

/// Extracts readable text from HTML; keeps it only when at least 100 chars
/// survive trimming.
fn extract_content(html: &str) -> Option<String> {
    let text = html2text::from_read(html.as_bytes(), 80);

    let cleaned: String = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.len() >= MIN_CONTENT_LEN {
        Some(cleaned)
    } else {
        debug!("extracted content too short ({} chars)", cleaned.len());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_keeps_long_article_text() {
        let paragraph = "This sentence is repeated to build a realistic article body. ".repeat(5);
        let html = format!("<html><body><article><p>{paragraph}</p></article></body></html>");
        let text = extract_content(&html).unwrap();
        assert!(text.len() >= MIN_CONTENT_LEN);
        assert!(text.contains("realistic article body"));
    }

    #[test]
    fn extract_rejects_short_pages() {
        assert!(extract_content("<html><body><p>Too short.</p></body></html>").is_none());
    }
}
