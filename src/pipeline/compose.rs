use serde_json::Value;
use tracing::{info, warn};

use crate::db::{Briefing, Store, StorylineNarrative};
use crate::error::Result;
use crate::llm::{parse_json_response, Generator};

use super::cluster::BRIEFLY_NOTED_LABEL;

const TLDR_MAX_TOKENS: u32 = 512;

const COMPOSE_PROMPT: &str = r#"You are writing the TL;DR for a daily AI news briefing aimed at software practitioners.

Here are today's storylines and their narratives:

{narratives}

Write a TL;DR section (3-5 bullet points) that captures the most important takeaways from ALL storylines. Each bullet should be one sentence that tells the reader what happened and why it matters.

Respond with ONLY this JSON:
{
    "tldr_bullets": [
        "First key takeaway",
        "Second key takeaway",
        "Third key takeaway"
    ]
}"#;

/// Assembles the final briefing from a period's narratives.
pub struct Composer<'a> {
    store: &'a Store,
    provider: Option<&'a dyn Generator>,
}

impl<'a> Composer<'a> {
    pub fn new(store: &'a Store, provider: Option<&'a dyn Generator>) -> Self {
        Self { store, provider }
    }

    /// Builds and persists the briefing plus its run report. Replaces any
    /// previous briefing for the period.
    pub async fn compose_briefing(&self, period_id: &str) -> Result<Briefing> {
        let narratives = self.store.narratives_for_period(period_id.to_string()).await?;
        let storylines = self.store.storylines_for_period(period_id.to_string()).await?;

        if narratives.is_empty() {
            info!("no narratives found for {}", period_id);
            return self.store_empty_briefing(period_id).await;
        }

        let tldr = self.generate_tldr(&narratives).await;
        let body = assemble_body(&narratives);

        let article_count: i64 = storylines.iter().map(|s| s.article_count).sum();
        let storyline_count = storylines.len() as i64;

        self.store
            .insert_briefing(
                period_id.to_string(),
                tldr,
                body,
                storyline_count,
                article_count,
            )
            .await?;
        self.store
            .insert_report(period_id.to_string(), article_count, storyline_count)
            .await?;

        let briefing = self
            .store
            .briefing(period_id.to_string())
            .await?
            .ok_or_else(|| anyhow::anyhow!("briefing missing after insert"))?;
        info!("briefing composed for {}: {} storylines", period_id, storyline_count);
        Ok(briefing)
    }

    async fn generate_tldr(&self, narratives: &[StorylineNarrative]) -> String {
        let Some(provider) = self.provider else {
            return fallback_tldr(narratives);
        };

        let digest: Vec<String> = narratives
            .iter()
            .filter(|n| n.title != BRIEFLY_NOTED_LABEL)
            .map(|n| format!("## {}\n{}", n.title, n.narrative_text))
            .collect();

        let prompt = COMPOSE_PROMPT.replace("{narratives}", &digest.join("\n\n"));

        let response = match provider.generate(&prompt, TLDR_MAX_TOKENS).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => return fallback_tldr(narratives),
            Err(e) => {
                warn!("TL;DR generation failed: {}", e);
                return fallback_tldr(narratives);
            }
        };

        let Some(parsed) = parse_json_response(&response) else {
            return fallback_tldr(narratives);
        };

        if let Some(Value::Array(bullets)) = parsed.get("tldr_bullets") {
            let lines: Vec<String> = bullets
                .iter()
                .filter_map(|b| b.as_str())
                .map(|b| format!("- {}", b))
                .collect();
            return lines.join("\n");
        }

        response.trim().to_string()
    }

    async fn store_empty_briefing(&self, period_id: &str) -> Result<Briefing> {
        self.store
            .insert_briefing(
                period_id.to_string(),
                "- No articles collected today.".to_string(),
                "No briefing content available for this period.".to_string(),
                0,
                0,
            )
            .await?;
        self.store.insert_report(period_id.to_string(), 0, 0).await?;
        let briefing = self
            .store
            .briefing(period_id.to_string())
            .await?
            .ok_or_else(|| anyhow::anyhow!("briefing missing after insert"))?;
        Ok(briefing)
    }
}

/// One bullet per non-"Briefly Noted" storyline title.
fn fallback_tldr(narratives: &[StorylineNarrative]) -> String {
    let bullets: Vec<String> = narratives
        .iter()
        .filter(|n| n.title != BRIEFLY_NOTED_LABEL)
        .map(|n| format!("- {}", n.title))
        .collect();

    if bullets.is_empty() {
        "- No significant storylines today.".to_string()
    } else {
        bullets.join("\n")
    }
}

/// Concatenates narrative sections, sources lists included, with the
/// "Briefly Noted" section last.
fn assemble_body(narratives: &[StorylineNarrative]) -> String {
    let mut sections = Vec::new();

    for narrative in narratives.iter().filter(|n| n.title != BRIEFLY_NOTED_LABEL) {
        let mut section = format!("## {}\n\n{}", narrative.title, narrative.narrative_text);
        if !narrative.source_references.is_empty() {
            let refs: Vec<String> = narrative
                .source_references
                .iter()
                .map(|r| {
                    let mut line = format!("- [{}]({})", r.title, r.url);
                    if !r.contribution.is_empty() {
                        line.push_str(" — ");
                        line.push_str(&r.contribution);
                    }
                    line
                })
                .collect();
            section.push_str("\n\n**Sources:**\n");
            section.push_str(&refs.join("\n"));
        }
        sections.push(section);
    }

    for narrative in narratives.iter().filter(|n| n.title == BRIEFLY_NOTED_LABEL) {
        sections.push(format!("## {}\n\n{}", narrative.title, narrative.narrative_text));
    }

    sections.join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SourceReference;

    fn narrative(title: &str, text: &str) -> StorylineNarrative {
        StorylineNarrative {
            id: 0,
            storyline_id: 0,
            period_id: "2026-02-06".to_string(),
            title: title.to_string(),
            narrative_text: text.to_string(),
            source_references: Vec::new(),
            generated_at: None,
        }
    }

    #[test]
    fn fallback_tldr_bullets_storyline_titles() {
        let narratives = vec![
            narrative("Agents Everywhere", "..."),
            narrative("Local Models Grow Up", "..."),
            narrative(BRIEFLY_NOTED_LABEL, "..."),
        ];
        assert_eq!(
            fallback_tldr(&narratives),
            "- Agents Everywhere\n- Local Models Grow Up"
        );
    }

    #[test]
    fn fallback_tldr_with_only_briefly_noted() {
        let narratives = vec![narrative(BRIEFLY_NOTED_LABEL, "...")];
        assert_eq!(fallback_tldr(&narratives), "- No significant storylines today.");
    }

    #[test]
    fn body_orders_briefly_noted_last() {
        let narratives = vec![
            narrative(BRIEFLY_NOTED_LABEL, "- **solo** (X): point"),
            narrative("Main Story", "The narrative."),
        ];
        let body = assemble_body(&narratives);
        let main_pos = body.find("## Main Story").unwrap();
        let briefly_pos = body.find("## Briefly Noted").unwrap();
        assert!(main_pos < briefly_pos);
        assert!(body.contains("\n\n---\n\n"));
    }

    #[test]
    fn body_renders_sources_with_contribution() {
        let mut n = narrative("Main Story", "Text.");
        n.source_references = vec![
            SourceReference {
                title: "A".to_string(),
                url: "https://a.com".to_string(),
                contribution: "added context".to_string(),
            },
            SourceReference {
                title: "B".to_string(),
                url: "https://b.com".to_string(),
                contribution: String::new(),
            },
        ];
        let body = assemble_body(&[n]);
        assert!(body.contains("**Sources:**"));
        assert!(body.contains("- [A](https://a.com) — added context"));
        assert!(body.contains("- [B](https://b.com)\n") || body.ends_with("- [B](https://b.com)"));
    }
}
