use tracing::{info, warn};

use crate::db::{Article, SourceReference, Store, Storyline};
use crate::error::Result;
use crate::llm::{get_str, parse_json_response, Generator};

use super::cluster::BRIEFLY_NOTED_LABEL;
use super::truncate_chars;

const SYNTHESIS_MAX_TOKENS: u32 = 1024;
const CONTENT_PREVIEW: usize = 300;

const SYNTHESIS_PROMPT: &str = r#"You are writing one section of a daily AI news briefing for software practitioners.

This section covers a storyline about: {label}

Write a cohesive 2-3 paragraph narrative that weaves these articles together. Write as if you're a well-informed colleague explaining what happened recently. Be specific about tools, techniques, and outcomes. Avoid marketing language.

Articles in this storyline:
{articles}

Respond with ONLY this JSON:
{
    "title": "A compelling 5-8 word section title",
    "narrative": "Your 2-3 paragraph narrative here. Use markdown for emphasis.",
    "source_references": [
        {"title": "Article Title", "url": "https://...", "contribution": "What this article added to the story"}
    ]
}"#;

/// Results of a synthesis run.
#[derive(Debug, Default)]
pub struct SynthesizeResult {
    pub narratives_created: usize,
    pub errors: usize,
}

/// Writes one narrative per storyline. Storylines that already have a
/// narrative are left alone, so re-runs are cheap.
pub struct Synthesizer<'a> {
    store: &'a Store,
    provider: Option<&'a dyn Generator>,
}

impl<'a> Synthesizer<'a> {
    pub fn new(store: &'a Store, provider: Option<&'a dyn Generator>) -> Self {
        Self { store, provider }
    }

    pub async fn synthesize_period(&self, period_id: &str) -> SynthesizeResult {
        let Some(provider) = self.provider else {
            warn!("no LLM provider available for synthesis");
            return SynthesizeResult { errors: 1, ..Default::default() };
        };

        let storylines = match self.store.storylines_for_period(period_id.to_string()).await {
            Ok(storylines) => storylines,
            Err(e) => {
                warn!("error getting storylines: {}", e);
                return SynthesizeResult { errors: 1, ..Default::default() };
            }
        };
        if storylines.is_empty() {
            info!("no storylines to synthesize for {}", period_id);
            return SynthesizeResult::default();
        }

        let mut result = SynthesizeResult::default();
        for storyline in storylines {
            let existing = self
                .store
                .narrative_for_storyline(storyline.id)
                .await
                .unwrap_or(None);
            if existing.is_some() {
                result.narratives_created += 1;
                continue;
            }

            let articles = self
                .store
                .storyline_articles(storyline.id)
                .await
                .unwrap_or_default();
            if articles.is_empty() {
                continue;
            }

            let outcome = if storyline.label == BRIEFLY_NOTED_LABEL {
                self.synthesize_briefly_noted(&storyline, &articles, period_id)
                    .await
            } else {
                self.synthesize_storyline(provider, &storyline, &articles, period_id)
                    .await
            };

            match outcome {
                Ok(()) => result.narratives_created += 1,
                Err(e) => {
                    warn!("error synthesizing storyline {}: {}", storyline.id, e);
                    result.errors += 1;
                }
            }
        }

        info!(
            "synthesis complete: {} narratives created, {} errors",
            result.narratives_created, result.errors
        );
        result
    }

    async fn synthesize_storyline(
        &self,
        provider: &dyn Generator,
        storyline: &Storyline,
        articles: &[Article],
        period_id: &str,
    ) -> Result<()> {
        let articles_text = self.format_articles(articles).await;
        let prompt = SYNTHESIS_PROMPT
            .replace("{label}", &storyline.label)
            .replace("{articles}", &articles_text);

        let response = provider.generate(&prompt, SYNTHESIS_MAX_TOKENS).await?;

        let (title, narrative, refs) = match parse_json_response(&response) {
            Some(parsed) => {
                let title = get_str(&parsed, "title", &storyline.label);
                let narrative = get_str(&parsed, "narrative", "");
                let refs = parse_source_refs(&parsed);
                (title, narrative, refs)
            }
            // Unparseable response: keep the raw text as the narrative and
            // derive references from the article set.
            None => (
                storyline.label.clone(),
                response.trim().to_string(),
                articles.iter().map(reference_for).collect(),
            ),
        };

        self.store
            .insert_narrative(storyline.id, period_id.to_string(), title, narrative, refs)
            .await?;
        Ok(())
    }

    /// The singleton bucket gets a bullet list instead of an LLM call.
    async fn synthesize_briefly_noted(
        &self,
        storyline: &Storyline,
        articles: &[Article],
        period_id: &str,
    ) -> Result<()> {
        let mut bullets = Vec::with_capacity(articles.len());
        let mut refs = Vec::with_capacity(articles.len());

        for article in articles {
            let triage = self.store.triage_for_article(article.id).await.unwrap_or(None);
            let point = triage
                .and_then(|t| t.key_points.into_iter().next())
                .unwrap_or_else(|| article.title.clone());

            let source = article.source.as_deref().unwrap_or("Unknown");
            bullets.push(format!("- **{}** ({}): {}", article.title, source, point));
            refs.push(reference_for(article));
        }

        let narrative = bullets.join("\n");
        self.store
            .insert_narrative(
                storyline.id,
                period_id.to_string(),
                BRIEFLY_NOTED_LABEL.to_string(),
                narrative,
                refs,
            )
            .await?;
        Ok(())
    }

    async fn format_articles(&self, articles: &[Article]) -> String {
        let mut parts = Vec::with_capacity(articles.len());
        for (i, article) in articles.iter().enumerate() {
            let triage = self.store.triage_for_article(article.id).await.unwrap_or(None);
            let key_points = triage
                .filter(|t| !t.key_points.is_empty())
                .map(|t| format!("\n  Key points: {}", t.key_points.join("; ")))
                .unwrap_or_default();

            let content_preview = article
                .content
                .as_deref()
                .map(|c| format!("\n  Content: {}...", truncate_chars(c, CONTENT_PREVIEW)))
                .unwrap_or_default();

            let source = article.source.as_deref().unwrap_or("Unknown");

            parts.push(format!(
                "[{}] {}\n  Source: {}\n  URL: {}{}{}",
                i + 1,
                article.title,
                source,
                article.url,
                key_points,
                content_preview
            ));
        }
        parts.join("\n\n")
    }
}

fn reference_for(article: &Article) -> SourceReference {
    SourceReference {
        title: article.title.clone(),
        url: article.url.clone(),
        contribution: String::new(),
    }
}

fn parse_source_refs(parsed: &serde_json::Map<String, serde_json::Value>) -> Vec<SourceReference> {
    let Some(serde_json::Value::Array(items)) = parsed.get("source_references") else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            Some(SourceReference {
                title: get_str(obj, "title", ""),
                url: get_str(obj, "url", ""),
                contribution: get_str(obj, "contribution", ""),
            })
        })
        .collect()
}
