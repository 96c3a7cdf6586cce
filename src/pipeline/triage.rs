use serde_json::Value;
use tracing::{info, warn};

use crate::db::{Article, ResearchPriority, Store};
use crate::error::Result;
use crate::llm::{get_i64, get_str, parse_json_response, Generator};

use super::truncate_chars;

const TRIAGE_MAX_TOKENS: u32 = 512;
const CONTENT_CAP: usize = 4000;

const TRIAGE_PROMPT: &str = r#"You are triaging AI news articles for a daily briefing aimed at people who build software.

Decide whether this article is RELEVANT or should be SKIPPED.

RELEVANT means: practical AI developments, experience reports from using AI tools, new techniques you can try, architecture patterns, tool releases, significant model updates, or insightful commentary on AI's impact on software development.

SKIP means: pure academic research papers, funding/investment announcements, marketing fluff, product launches with no technical substance, celebrity AI opinions, or AI doom/hype pieces with no practical content.

Research priorities to give extra weight:
{priorities}

Article Title: {title}
Source: {source}
Content:
{content}

Respond with ONLY this JSON:
{
    "verdict": "relevant" or "skip",
    "article_type": "experience_report" | "tool_release" | "technique" | "architecture" | "model_update" | "commentary" | "tutorial" | "announcement" | "other",
    "key_points": ["point 1", "point 2", "point 3"],
    "relevance_reason": "One sentence explaining your verdict",
    "practical_score": 1-5
}

practical_score: 5 = immediately actionable, 1 = tangentially related. Skip articles get 0."#;

/// Results of a triage run.
#[derive(Debug, Default)]
pub struct TriageResult {
    pub processed: usize,
    pub relevant: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// One article's triage verdict, after clamping.
#[derive(Debug)]
struct TriageOutcome {
    verdict: String,
    article_type: Option<String>,
    key_points: Vec<String>,
    reason: Option<String>,
    practical_score: i64,
}

/// Classifies articles for relevance and practical value via the LLM.
pub struct Triager<'a> {
    store: &'a Store,
    provider: Option<&'a dyn Generator>,
}

impl<'a> Triager<'a> {
    pub fn new(store: &'a Store, provider: Option<&'a dyn Generator>) -> Self {
        Self { store, provider }
    }

    /// Triages every untriaged article in the period. Provider errors count
    /// and skip the article; there are no retries.
    pub async fn triage_articles(&self, period_id: &str) -> TriageResult {
        let Some(provider) = self.provider else {
            warn!("no LLM provider available for triage");
            return TriageResult { errors: 1, ..Default::default() };
        };

        let articles = match self.store.untriaged_articles(Some(period_id.to_string())).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!("error getting untriaged articles: {}", e);
                return TriageResult { errors: 1, ..Default::default() };
            }
        };

        if articles.is_empty() {
            info!("no articles pending triage");
            return TriageResult::default();
        }

        let priorities = self.store.active_priorities().await.unwrap_or_default();
        let priorities_text = format_priorities(&priorities);

        let mut result = TriageResult::default();
        for article in articles {
            let outcome = match self.triage_article(provider, &article, &priorities_text).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("error triaging article {}: {}", article.id, e);
                    result.errors += 1;
                    continue;
                }
            };

            if let Err(e) = self
                .store
                .insert_triage(
                    article.id,
                    outcome.verdict.clone(),
                    outcome.article_type,
                    outcome.key_points,
                    outcome.reason,
                    outcome.practical_score,
                )
                .await
            {
                warn!("error storing triage for article {}: {}", article.id, e);
                result.errors += 1;
                continue;
            }

            result.processed += 1;
            if outcome.verdict == "relevant" {
                result.relevant += 1;
            } else {
                result.skipped += 1;
            }
            info!("triaged [{}]: {}", outcome.verdict, article.title);
        }

        info!(
            "triage complete: {} processed ({} relevant, {} skipped), {} errors",
            result.processed, result.relevant, result.skipped, result.errors
        );
        result
    }

    async fn triage_article(
        &self,
        provider: &dyn Generator,
        article: &Article,
        priorities_text: &str,
    ) -> Result<TriageOutcome> {
        let mut content = article.content.clone().unwrap_or_default();
        if content.is_empty() {
            content = article.title.clone();
        }
        let content = if content.chars().count() > CONTENT_CAP {
            format!("{}...", truncate_chars(&content, CONTENT_CAP))
        } else {
            content
        };

        let source = article.source.as_deref().unwrap_or("Unknown");

        let prompt = TRIAGE_PROMPT
            .replace("{priorities}", priorities_text)
            .replace("{title}", &article.title)
            .replace("{source}", source)
            .replace("{content}", &content);

        let response = provider.generate(&prompt, TRIAGE_MAX_TOKENS).await?;
        Ok(outcome_from_response(&response))
    }
}

/// Maps a raw LLM response to a verdict, applying the recovery defaults and
/// clamping rules.
fn outcome_from_response(response: &str) -> TriageOutcome {
    let Some(parsed) = parse_json_response(response) else {
        // Unparseable responses default to keeping the article.
        return TriageOutcome {
            verdict: "relevant".to_string(),
            article_type: Some("other".to_string()),
            key_points: Vec::new(),
            reason: Some("LLM response could not be parsed".to_string()),
            practical_score: 2,
        };
    };

    let mut verdict = get_str(&parsed, "verdict", "relevant").to_lowercase();
    if verdict != "relevant" && verdict != "skip" {
        verdict = "relevant".to_string();
    }

    let article_type = get_str(&parsed, "article_type", "other");
    let reason = get_str(&parsed, "relevance_reason", "");

    let mut key_points: Vec<String> = match parsed.get("key_points") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };
    key_points.truncate(5);

    let mut score = get_i64(&parsed, "practical_score", 2);
    if verdict == "skip" {
        score = 0;
    } else {
        score = score.clamp(1, 5);
    }

    TriageOutcome {
        verdict,
        article_type: Some(article_type),
        key_points,
        reason: Some(reason),
        practical_score: score,
    }
}

fn format_priorities(priorities: &[ResearchPriority]) -> String {
    if priorities.is_empty() {
        return "None defined".to_string();
    }
    priorities
        .iter()
        .map(|p| {
            let mut line = format!("- {}", p.title);
            if let Some(desc) = p.description.as_deref().filter(|d| !d.is_empty()) {
                line.push_str(": ");
                line.push_str(truncate_chars(desc, 100));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_verdict_forces_zero_score() {
        let outcome = outcome_from_response(r#"{"verdict": "skip", "practical_score": 4}"#);
        assert_eq!(outcome.verdict, "skip");
        assert_eq!(outcome.practical_score, 0);
    }

    #[test]
    fn relevant_score_clamps_into_range() {
        let high = outcome_from_response(r#"{"verdict": "relevant", "practical_score": 9}"#);
        assert_eq!(high.practical_score, 5);

        let low = outcome_from_response(r#"{"verdict": "relevant", "practical_score": 0}"#);
        assert_eq!(low.practical_score, 1);
    }

    #[test]
    fn unknown_verdict_defaults_to_relevant() {
        let outcome = outcome_from_response(r#"{"verdict": "maybe", "practical_score": 3}"#);
        assert_eq!(outcome.verdict, "relevant");
        assert_eq!(outcome.practical_score, 3);
    }

    #[test]
    fn verdict_is_case_insensitive() {
        let outcome = outcome_from_response(r#"{"verdict": "SKIP"}"#);
        assert_eq!(outcome.verdict, "skip");
    }

    #[test]
    fn unparseable_response_keeps_article() {
        let outcome = outcome_from_response("I couldn't decide, sorry!");
        assert_eq!(outcome.verdict, "relevant");
        assert_eq!(outcome.article_type.as_deref(), Some("other"));
        assert!(outcome.key_points.is_empty());
        assert_eq!(outcome.practical_score, 2);
        assert_eq!(
            outcome.reason.as_deref(),
            Some("LLM response could not be parsed")
        );
    }

    #[test]
    fn fenced_response_parses() {
        let outcome = outcome_from_response(
            "```json\n{\"verdict\": \"relevant\", \"key_points\": [\"a\", \"b\"], \"practical_score\": 4}\n```",
        );
        assert_eq!(outcome.verdict, "relevant");
        assert_eq!(outcome.key_points, vec!["a", "b"]);
        assert_eq!(outcome.practical_score, 4);
    }

    #[test]
    fn key_points_truncate_to_five() {
        let outcome = outcome_from_response(
            r#"{"verdict": "relevant", "key_points": ["1","2","3","4","5","6","7"]}"#,
        );
        assert_eq!(outcome.key_points.len(), 5);
    }

    #[test]
    fn priorities_format_with_descriptions() {
        let priorities = vec![
            ResearchPriority {
                id: 1,
                title: "Agent frameworks".to_string(),
                description: Some("Multi-agent orchestration".to_string()),
                keywords: Vec::new(),
                is_active: true,
                created_at: None,
                updated_at: None,
            },
            ResearchPriority {
                id: 2,
                title: "Local inference".to_string(),
                description: None,
                keywords: Vec::new(),
                is_active: true,
                created_at: None,
                updated_at: None,
            },
        ];
        let text = format_priorities(&priorities);
        assert_eq!(
            text,
            "- Agent frameworks: Multi-agent orchestration\n- Local inference"
        );
        assert_eq!(format_priorities(&[]), "None defined");
    }
}
