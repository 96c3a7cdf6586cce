use std::collections::HashMap;

use tracing::info;

use crate::db::{Article, Store};
use crate::error::{AppError, Result};
use crate::llm::Embedder;

use super::truncate_chars;
use super::ward::{cut_dendrogram, pairwise_distances, ward_linkage};

pub const BRIEFLY_NOTED_LABEL: &str = "Briefly Noted";
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1.2;

/// Results of a clustering run.
#[derive(Debug, Default)]
pub struct ClusterResult {
    pub storyline_count: usize,
    pub article_count: usize,
    pub briefly_noted_count: usize,
}

/// Groups relevant articles into storylines by embedding similarity.
pub struct Clusterer<'a> {
    store: &'a Store,
    embedder: Option<&'a dyn Embedder>,
    distance_threshold: f64,
}

impl<'a> Clusterer<'a> {
    pub fn new(
        store: &'a Store,
        embedder: Option<&'a dyn Embedder>,
        distance_threshold: f64,
    ) -> Self {
        let distance_threshold = if distance_threshold <= 0.0 {
            DEFAULT_DISTANCE_THRESHOLD
        } else {
            distance_threshold
        };
        Self {
            store,
            embedder,
            distance_threshold,
        }
    }

    /// Clusters the period's relevant articles into storylines. Existing
    /// storylines for the period are wiped first so re-runs are clean.
    pub async fn cluster_articles(&self, period_id: &str) -> Result<ClusterResult> {
        let articles = self.store.relevant_articles(period_id.to_string()).await?;

        if articles.is_empty() {
            info!("no relevant articles to cluster for {}", period_id);
            return Ok(ClusterResult::default());
        }

        self.store
            .clear_storylines_for_period(period_id.to_string())
            .await?;

        if articles.len() < 2 {
            let ids = articles.iter().map(|a| a.id).collect();
            self.store
                .insert_storyline(
                    period_id.to_string(),
                    BRIEFLY_NOTED_LABEL.to_string(),
                    ids,
                )
                .await?;
            return Ok(ClusterResult {
                storyline_count: 1,
                article_count: articles.len(),
                briefly_noted_count: articles.len(),
            });
        }

        let mut texts = Vec::with_capacity(articles.len());
        for article in &articles {
            texts.push(self.article_text(article).await?);
        }

        info!("generating embeddings for {} articles...", articles.len());
        let embedder = self.embedder.ok_or_else(|| {
            AppError::Provider("no embedding provider available for clustering".to_string())
        })?;
        let embeddings = embedder.embed(&texts).await?;

        if embeddings.len() != articles.len() {
            return Err(AppError::Provider(format!(
                "embedder returned {} vectors for {} articles",
                embeddings.len(),
                articles.len()
            )));
        }
        let dim = embeddings[0].len();
        if dim == 0 || embeddings.iter().any(|v| v.len() != dim) {
            return Err(AppError::Provider(
                "embedder returned vectors of mismatched dimension".to_string(),
            ));
        }

        let labels = self.cluster_embeddings(&embeddings);

        // Partition by label; labels are dense 0-based indices.
        let group_count = labels.iter().max().copied().unwrap_or(0) + 1;
        let mut groups: Vec<Vec<&Article>> = vec![Vec::new(); group_count];
        for (article, &label) in articles.iter().zip(&labels) {
            groups[label].push(article);
        }

        let mut storyline_count = 0;
        let mut briefly_noted: Vec<&Article> = Vec::new();

        for group in &groups {
            if group.len() >= 2 {
                let label = generate_label(group);
                let ids = group.iter().map(|a| a.id).collect();
                self.store
                    .insert_storyline(period_id.to_string(), label, ids)
                    .await?;
                storyline_count += 1;
            } else {
                briefly_noted.extend(group);
            }
        }

        let briefly_noted_count = briefly_noted.len();
        if !briefly_noted.is_empty() {
            let ids = briefly_noted.iter().map(|a| a.id).collect();
            self.store
                .insert_storyline(
                    period_id.to_string(),
                    BRIEFLY_NOTED_LABEL.to_string(),
                    ids,
                )
                .await?;
        }

        let total_storylines = storyline_count + usize::from(briefly_noted_count > 0);

        info!(
            "clustering complete: {} storylines + {} briefly noted from {} articles",
            storyline_count,
            briefly_noted_count,
            articles.len()
        );

        Ok(ClusterResult {
            storyline_count: total_storylines,
            article_count: articles.len(),
            briefly_noted_count,
        })
    }

    /// Embedding text: title, triage key points, first 500 chars of content.
    async fn article_text(&self, article: &Article) -> Result<String> {
        let mut parts = vec![article.title.clone()];

        if let Some(triage) = self.store.triage_for_article(article.id).await? {
            parts.extend(triage.key_points);
        }

        if let Some(content) = &article.content {
            parts.push(truncate_chars(content, 500).to_string());
        }

        Ok(parts.join(" "))
    }

    fn cluster_embeddings(&self, embeddings: &[Vec<f64>]) -> Vec<usize> {
        let dist = pairwise_distances(embeddings);
        let merges = ward_linkage(&dist, embeddings.len());
        cut_dendrogram(&merges, embeddings.len(), self.distance_threshold)
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "shall",
    "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through",
    "during", "before", "after", "above", "below", "and", "but", "or", "nor", "not", "so",
    "yet", "both", "either", "neither", "each", "every", "all", "any", "few", "more", "most",
    "other", "some", "such", "no", "only", "own", "same", "than", "too", "very", "just", "how",
    "what", "which", "who", "whom", "this", "that", "these", "those", "it", "its", "new",
    "about", "up", "out", "one", "two", "also", "like", "get", "use",
];

/// Labels a multi-article storyline from the most frequent title words,
/// ties broken by first appearance. Falls back to the first title.
fn generate_label(articles: &[&Article]) -> String {
    // word -> (count, first-seen order)
    let mut word_counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for article in articles {
        for word in article.title.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| ".,!?:;\"'()-[]".contains(c));
            if word.chars().count() <= 2 || STOP_WORDS.contains(&word) {
                continue;
            }
            let entry = word_counts.entry(word.to_string()).or_insert_with(|| {
                let e = (0, order);
                order += 1;
                e
            });
            entry.0 += 1;
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = word_counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

    let top_words: Vec<String> = ranked
        .into_iter()
        .take(3)
        .map(|(word, _)| title_case(&word))
        .collect();

    if !top_words.is_empty() {
        return top_words.join(" ");
    }

    truncate_chars(&articles[0].title, 50).to_string()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: i64, title: &str) -> Article {
        Article {
            id,
            url: format!("https://example.com/{id}"),
            title: title.to_string(),
            source: None,
            published_date: None,
            content: None,
            content_fetched: false,
            period_id: Some("2026-02-06".to_string()),
            collected_at: None,
        }
    }

    #[test]
    fn label_uses_most_frequent_title_words() {
        let a = article(1, "Rust compiler speeds up incremental builds");
        let b = article(2, "Incremental compiler caching lands in Rust");
        let c = article(3, "Rust incremental compilation deep dive");
        let group = vec![&a, &b, &c];

        let label = generate_label(&group);
        assert!(label.contains("Rust"), "label was {label:?}");
        assert!(label.contains("Incremental"), "label was {label:?}");
    }

    #[test]
    fn label_ties_break_by_first_seen() {
        let a = article(1, "alpha beta gamma delta");
        let b = article(2, "alpha beta gamma delta");
        let group = vec![&a, &b];

        // All four words tie at count 2; first three seen win, in order.
        assert_eq!(generate_label(&group), "Alpha Beta Gamma");
    }

    #[test]
    fn label_skips_stop_words_and_short_tokens() {
        let a = article(1, "The AI of the new era");
        let b = article(2, "A new era for the AI");
        let group = vec![&a, &b];

        // "the", "of", "new", "a", "for" are stopped; "AI" is too short.
        assert_eq!(generate_label(&group), "Era");
    }

    #[test]
    fn label_falls_back_to_first_title() {
        let a = article(1, "An of to in");
        let b = article(2, "The and or so");
        let group = vec![&a, &b];

        assert_eq!(generate_label(&group), "An of to in");
    }

    #[test]
    fn label_fallback_truncates_to_50_chars() {
        let long = "it ".repeat(40);
        let a = article(1, &long);
        let b = article(2, "the");
        let group = vec![&a, &b];

        assert_eq!(generate_label(&group).chars().count(), 50);
    }

    #[test]
    fn title_case_uppercases_first_letter() {
        assert_eq!(title_case("rust"), "Rust");
        assert_eq!(title_case("llm"), "Llm");
    }
}
