use serde::{Deserialize, Serialize};

/// A collected article.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub source: Option<String>,
    pub published_date: Option<String>,
    pub content: Option<String>,
    pub content_fetched: bool,
    pub period_id: Option<String>,
    pub collected_at: Option<String>,
}

/// Triage verdict for one article.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleTriage {
    pub article_id: i64,
    pub verdict: String, // "relevant" or "skip"
    pub article_type: Option<String>,
    pub key_points: Vec<String>,
    pub relevance_reason: Option<String>,
    pub practical_score: i64,
    pub triaged_at: Option<String>,
}

/// A cluster of related articles within a period.
#[derive(Debug, Clone, Serialize)]
pub struct Storyline {
    pub id: i64,
    pub period_id: String,
    pub label: String,
    pub article_count: i64,
    pub created_at: Option<String>,
}

/// The generated narrative for a storyline.
#[derive(Debug, Clone, Serialize)]
pub struct StorylineNarrative {
    pub id: i64,
    pub storyline_id: i64,
    pub period_id: String,
    pub title: String,
    pub narrative_text: String,
    pub source_references: Vec<SourceReference>,
    pub generated_at: Option<String>,
}

/// A reference to an article cited by a narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contribution: String,
}

/// A complete briefing for a period.
#[derive(Debug, Clone, Serialize)]
pub struct Briefing {
    pub id: i64,
    pub period_id: String,
    pub tldr: String,
    pub body_markdown: String,
    pub storyline_count: i64,
    pub article_count: i64,
    pub generated_at: Option<String>,
}

/// A user-defined research priority.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchPriority {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub is_active: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Aggregate database statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_articles: i64,
    pub triaged_articles: i64,
    pub relevant_articles: i64,
    pub periods_with_articles: i64,
    pub briefings: i64,
    pub storylines: i64,
    pub total_priorities: i64,
    pub active_priorities: i64,
}

/// Triage counts for a period.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TriageStats {
    pub total: i64,
    pub relevant: i64,
    pub skipped: i64,
}
