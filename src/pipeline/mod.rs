pub mod cluster;
pub mod collect;
pub mod compose;
pub mod feed;
pub mod fetch;
pub mod newsapi;
pub mod resolve;
pub mod synthesize;
pub mod triage;
mod ward;

pub use resolve::resolve_period;

use tracing::info;

use crate::config::Config;
use crate::db::Store;
use crate::error::AppError;
use crate::llm::{self, Embedder, Generator};

use cluster::Clusterer;
use collect::Collector;
use compose::Composer;
use fetch::ContentFetcher;
use synthesize::Synthesizer;
use triage::Triager;

/// The outcome of one pipeline step.
#[derive(Debug)]
pub struct StepResult {
    pub name: &'static str,
    pub summary: String,
    pub err: Option<AppError>,
}

impl StepResult {
    fn ok(name: &'static str, summary: String) -> Self {
        Self { name, summary, err: None }
    }

    fn err(name: &'static str, err: AppError) -> Self {
        Self { name, summary: String::new(), err: Some(err) }
    }
}

/// Results of a full pipeline run.
#[derive(Debug)]
pub struct RunResult {
    pub period_id: String,
    pub steps: Vec<StepResult>,
}

/// Sequences the six stages: collect, fetch, triage, cluster, synthesize,
/// compose. Collect and cluster are gating; other stage failures are
/// recorded and the run continues.
pub struct Pipeline {
    cfg: Config,
    store: Store,
    provider: Option<Box<dyn Generator>>,
    embedder: Box<dyn Embedder>,
}

impl Pipeline {
    pub async fn new(cfg: Config, store: Store) -> Self {
        let provider = llm::create_provider(&cfg.summarization).await;
        let embedder = llm::create_embedder(&cfg.summarization);
        Self { cfg, store, provider, embedder }
    }

    pub async fn run(&self, period_id: &str, days_back: i64) -> RunResult {
        let mut result = RunResult {
            period_id: period_id.to_string(),
            steps: Vec::new(),
        };

        let step = self.run_collect(period_id, days_back).await;
        let failed = step.err.is_some();
        result.steps.push(step);
        if failed {
            return result;
        }

        result.steps.push(self.run_fetch(period_id).await);
        result.steps.push(self.run_triage(period_id).await);

        let step = self.run_cluster(period_id).await;
        let failed = step.err.is_some();
        result.steps.push(step);
        if failed {
            // Synthesis and composition need storylines; stop here.
            return result;
        }

        result.steps.push(self.run_synthesize(period_id).await);
        result.steps.push(self.run_compose(period_id).await);

        result
    }

    /// Reports what each stage would do, without writes or provider calls.
    pub async fn dry_run(&self, period_id: &str) -> RunResult {
        let mut result = RunResult {
            period_id: period_id.to_string(),
            steps: Vec::new(),
        };

        let articles = self
            .store
            .articles_for_period(period_id.to_string())
            .await
            .unwrap_or_default();
        result.steps.push(StepResult::ok(
            "Collect",
            format!("[dry-run] {} articles already in DB for {}", articles.len(), period_id),
        ));

        let needing = self
            .store
            .articles_needing_fetch(Some(period_id.to_string()))
            .await
            .unwrap_or_default();
        result.steps.push(StepResult::ok(
            "Fetch",
            format!("[dry-run] {} articles need content fetching", needing.len()),
        ));

        let untriaged = self
            .store
            .untriaged_articles(Some(period_id.to_string()))
            .await
            .unwrap_or_default();
        result.steps.push(StepResult::ok(
            "Triage",
            format!("[dry-run] {} articles need triage", untriaged.len()),
        ));

        let relevant = self
            .store
            .relevant_articles(period_id.to_string())
            .await
            .unwrap_or_default();
        result.steps.push(StepResult::ok(
            "Cluster",
            format!("[dry-run] {} relevant articles to cluster", relevant.len()),
        ));

        let storylines = self
            .store
            .storylines_for_period(period_id.to_string())
            .await
            .unwrap_or_default();
        result.steps.push(StepResult::ok(
            "Synthesize",
            format!("[dry-run] {} storylines need narratives", storylines.len()),
        ));

        let briefing = self.store.briefing(period_id.to_string()).await.unwrap_or(None);
        let summary = if briefing.is_some() {
            format!("[dry-run] Briefing already exists for {}", period_id)
        } else {
            format!("[dry-run] Would compose briefing for {}", period_id)
        };
        result.steps.push(StepResult::ok("Compose", summary));

        result
    }

    async fn run_collect(&self, period_id: &str, days_back: i64) -> StepResult {
        info!("step 1/6: collecting articles...");
        let collector = Collector::new(&self.cfg, &self.store, days_back);
        match collector.collect(period_id).await {
            Ok(r) => StepResult::ok(
                "Collect",
                format!(
                    "Found {} new articles ({} total, {} duplicates)",
                    r.new_articles, r.total_found, r.duplicates
                ),
            ),
            Err(e) => StepResult::err("Collect", e),
        }
    }

    async fn run_fetch(&self, period_id: &str) -> StepResult {
        info!("step 2/6: fetching article content...");
        let fetcher = ContentFetcher::new(&self.store);
        match fetcher.fetch_missing_content(Some(period_id.to_string())).await {
            Ok(r) => StepResult::ok(
                "Fetch",
                format!("Fetched {} articles, {} failed", r.fetched, r.failed),
            ),
            Err(e) => StepResult::err("Fetch", e),
        }
    }

    async fn run_triage(&self, period_id: &str) -> StepResult {
        info!("step 3/6: triaging articles...");
        let triager = Triager::new(&self.store, self.provider.as_deref());
        let r = triager.triage_articles(period_id).await;
        StepResult::ok(
            "Triage",
            format!(
                "Triaged {} articles: {} relevant, {} skipped",
                r.processed, r.relevant, r.skipped
            ),
        )
    }

    async fn run_cluster(&self, period_id: &str) -> StepResult {
        info!("step 4/6: clustering into storylines...");
        let clusterer = Clusterer::new(&self.store, Some(self.embedder.as_ref()), 0.0);
        match clusterer.cluster_articles(period_id).await {
            Ok(r) => StepResult::ok(
                "Cluster",
                format!(
                    "Created {} storylines from {} articles",
                    r.storyline_count, r.article_count
                ),
            ),
            Err(e) => StepResult::err("Cluster", e),
        }
    }

    async fn run_synthesize(&self, period_id: &str) -> StepResult {
        info!("step 5/6: synthesizing narratives...");
        let synthesizer = Synthesizer::new(&self.store, self.provider.as_deref());
        let r = synthesizer.synthesize_period(period_id).await;
        StepResult::ok(
            "Synthesize",
            format!("Synthesized {} narratives", r.narratives_created),
        )
    }

    async fn run_compose(&self, period_id: &str) -> StepResult {
        info!("step 6/6: composing briefing...");
        let composer = Composer::new(&self.store, self.provider.as_deref());
        match composer.compose_briefing(period_id).await {
            Ok(briefing) => StepResult::ok(
                "Compose",
                format!(
                    "Briefing composed: {} storylines, {} articles",
                    briefing.storyline_count, briefing.article_count
                ),
            ),
            Err(e) => StepResult::err("Compose", e),
        }
    }
}

/// Truncates to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters count as one.
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
    }

    #[test]
    fn truncate_chars_empty() {
        assert_eq!(truncate_chars("", 5), "");
    }
}
