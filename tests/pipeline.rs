//! End-to-end tests over the store and the LLM-facing pipeline stages,
//! using mock providers and a throwaway database per test.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use aicrawler::db::Store;
use aicrawler::error::{AppError, Result};
use aicrawler::llm::{Embedder, Generator};
use aicrawler::pipeline::cluster::{Clusterer, BRIEFLY_NOTED_LABEL, DEFAULT_DISTANCE_THRESHOLD};
use aicrawler::pipeline::compose::Composer;
use aicrawler::pipeline::synthesize::Synthesizer;
use aicrawler::pipeline::triage::Triager;

const PERIOD: &str = "2026-02-06";

async fn open_test_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("test.db")).await.unwrap();
    (dir, store)
}

async fn insert_article(store: &Store, url: &str, title: &str, content: Option<&str>) -> i64 {
    store
        .insert_article(
            url.to_string(),
            title.to_string(),
            None,
            None,
            content.map(String::from),
            PERIOD.to_string(),
        )
        .await
        .unwrap()
}

/// Returns a fixed response and counts invocations.
struct MockGenerator {
    response: String,
    calls: AtomicUsize,
}

impl MockGenerator {
    fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    async fn is_configured(&self) -> bool {
        true
    }
}

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        Err(AppError::Provider("mock provider down".to_string()))
    }

    async fn is_configured(&self) -> bool {
        true
    }
}

struct MockEmbedder {
    embeddings: Vec<Vec<f64>>,
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(self.embeddings.clone())
    }
}

// --- store ---

#[tokio::test]
async fn duplicate_url_keeps_first_article() {
    let (_dir, store) = open_test_store().await;

    let first = insert_article(&store, "https://a", "First", None).await;
    assert!(first > 0);

    let second = insert_article(&store, "https://a", "Second", None).await;
    assert_eq!(second, 0, "duplicate insert should report no new row");

    let article = store.article_by_id(first).await.unwrap().unwrap();
    assert_eq!(article.title, "First");
}

#[tokio::test]
async fn update_content_sets_fetched_flag() {
    let (_dir, store) = open_test_store().await;
    let id = insert_article(&store, "https://a.com", "Test", None).await;

    store
        .update_article_content(id, "Fetched content".to_string())
        .await
        .unwrap();

    let article = store.article_by_id(id).await.unwrap().unwrap();
    assert_eq!(article.content.as_deref(), Some("Fetched content"));
    assert!(article.content_fetched);
}

#[tokio::test]
async fn needing_fetch_excludes_attempted_and_filled() {
    let (_dir, store) = open_test_store().await;
    let empty = insert_article(&store, "https://a.com", "No content", None).await;
    insert_article(&store, "https://b.com", "Has content", Some("Some text")).await;
    let attempted = insert_article(&store, "https://c.com", "Tried", None).await;
    store.mark_article_fetch_attempted(attempted).await.unwrap();

    let needing = store
        .articles_needing_fetch(Some(PERIOD.to_string()))
        .await
        .unwrap();
    assert_eq!(needing.len(), 1);
    assert_eq!(needing[0].id, empty);
}

#[tokio::test]
async fn triage_lifecycle_and_replace() {
    let (_dir, store) = open_test_store().await;
    let id = insert_article(&store, "https://a.com", "Test", None).await;

    let untriaged = store.untriaged_articles(Some(PERIOD.to_string())).await.unwrap();
    assert_eq!(untriaged.len(), 1);

    store
        .insert_triage(
            id,
            "relevant".to_string(),
            Some("experience_report".to_string()),
            vec!["Point 1".to_string(), "Point 2".to_string()],
            Some("Practical AI content".to_string()),
            4,
        )
        .await
        .unwrap();

    assert!(store
        .untriaged_articles(Some(PERIOD.to_string()))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.relevant_articles(PERIOD.to_string()).await.unwrap().len(), 1);

    let triage = store.triage_for_article(id).await.unwrap().unwrap();
    assert_eq!(triage.verdict, "relevant");
    assert_eq!(triage.key_points, vec!["Point 1", "Point 2"]);
    assert_eq!(triage.practical_score, 4);

    // Re-triage replaces the row.
    store
        .insert_triage(id, "skip".to_string(), None, Vec::new(), None, 0)
        .await
        .unwrap();
    let triage = store.triage_for_article(id).await.unwrap().unwrap();
    assert_eq!(triage.verdict, "skip");
    assert_eq!(triage.practical_score, 0);
    assert!(triage.key_points.is_empty());
}

#[tokio::test]
async fn triage_stats_count_verdicts() {
    let (_dir, store) = open_test_store().await;
    let a = insert_article(&store, "https://a.com", "A", None).await;
    let b = insert_article(&store, "https://b.com", "B", None).await;
    store
        .insert_triage(a, "relevant".to_string(), None, Vec::new(), None, 3)
        .await
        .unwrap();
    store
        .insert_triage(b, "skip".to_string(), None, Vec::new(), None, 0)
        .await
        .unwrap();

    let stats = store.triage_stats(PERIOD.to_string()).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.relevant, 1);
    assert_eq!(stats.skipped, 1);
}

#[tokio::test]
async fn storyline_count_matches_junction_rows() {
    let (_dir, store) = open_test_store().await;
    let a = insert_article(&store, "https://a.com", "A", None).await;
    let b = insert_article(&store, "https://b.com", "B", None).await;

    let sid = store
        .insert_storyline(PERIOD.to_string(), "AI Testing".to_string(), vec![a, b])
        .await
        .unwrap();
    assert!(sid > 0);

    let storylines = store.storylines_for_period(PERIOD.to_string()).await.unwrap();
    assert_eq!(storylines.len(), 1);
    assert_eq!(storylines[0].label, "AI Testing");
    assert_eq!(storylines[0].article_count, 2);

    let articles = store.storyline_articles(sid).await.unwrap();
    assert_eq!(articles.len() as i64, storylines[0].article_count);
}

#[tokio::test]
async fn storylines_ordered_by_size_desc() {
    let (_dir, store) = open_test_store().await;
    let a = insert_article(&store, "https://a.com", "A", None).await;
    let b = insert_article(&store, "https://b.com", "B", None).await;
    let c = insert_article(&store, "https://c.com", "C", None).await;

    store
        .insert_storyline(PERIOD.to_string(), "Small".to_string(), vec![a])
        .await
        .unwrap();
    store
        .insert_storyline(PERIOD.to_string(), "Big".to_string(), vec![b, c])
        .await
        .unwrap();

    let storylines = store.storylines_for_period(PERIOD.to_string()).await.unwrap();
    assert_eq!(storylines[0].label, "Big");
    assert_eq!(storylines[1].label, "Small");
}

#[tokio::test]
async fn clear_storylines_removes_junctions_and_narratives() {
    let (_dir, store) = open_test_store().await;
    let a = insert_article(&store, "https://a.com", "A", None).await;
    let sid = store
        .insert_storyline(PERIOD.to_string(), "Test".to_string(), vec![a])
        .await
        .unwrap();
    store
        .insert_narrative(sid, PERIOD.to_string(), "T".to_string(), "N".to_string(), Vec::new())
        .await
        .unwrap();

    store.clear_storylines_for_period(PERIOD.to_string()).await.unwrap();

    assert!(store.storylines_for_period(PERIOD.to_string()).await.unwrap().is_empty());
    assert!(store.narratives_for_period(PERIOD.to_string()).await.unwrap().is_empty());
}

#[tokio::test]
async fn briefing_replaces_by_period() {
    let (_dir, store) = open_test_store().await;
    store
        .insert_briefing(PERIOD.to_string(), "- v1".to_string(), "body v1".to_string(), 3, 15)
        .await
        .unwrap();
    store
        .insert_briefing(PERIOD.to_string(), "- v2".to_string(), "body v2".to_string(), 2, 9)
        .await
        .unwrap();

    let briefing = store.briefing(PERIOD.to_string()).await.unwrap().unwrap();
    assert_eq!(briefing.tldr, "- v2");
    assert_eq!(briefing.storyline_count, 2);

    let all = store.all_briefings().await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn last_run_date_uses_range_end() {
    let (_dir, store) = open_test_store().await;
    assert!(store.last_run_date().await.unwrap().is_none());

    store.insert_report("2026-02-05".to_string(), 10, 3).await.unwrap();
    assert_eq!(store.last_run_date().await.unwrap().as_deref(), Some("2026-02-05"));

    store
        .insert_report("2026-02-06..2026-02-08".to_string(), 4, 1)
        .await
        .unwrap();
    assert_eq!(store.last_run_date().await.unwrap().as_deref(), Some("2026-02-08"));
}

#[tokio::test]
async fn priority_lifecycle() {
    let (_dir, store) = open_test_store().await;
    let id = store
        .insert_priority("AI Agents".to_string(), "Agent frameworks".to_string(), Vec::new())
        .await
        .unwrap();
    assert!(id > 0);

    let priority = store.priority(id).await.unwrap().unwrap();
    assert_eq!(priority.title, "AI Agents");
    assert!(priority.is_active);

    store.toggle_priority(id).await.unwrap();
    let priority = store.priority(id).await.unwrap().unwrap();
    assert!(!priority.is_active);
    assert!(store.active_priorities().await.unwrap().is_empty());

    store
        .update_priority(id, Some("AI Agent Frameworks".to_string()), None, None)
        .await
        .unwrap();
    let priority = store.priority(id).await.unwrap().unwrap();
    assert_eq!(priority.title, "AI Agent Frameworks");

    store.delete_priority(id).await.unwrap();
    assert!(store.priority(id).await.unwrap().is_none());
}

#[tokio::test]
async fn stats_aggregate_counts() {
    let (_dir, store) = open_test_store().await;
    insert_article(&store, "https://a.com", "A", None).await;
    store
        .insert_priority("Test Priority".to_string(), String::new(), Vec::new())
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_articles, 1);
    assert_eq!(stats.total_priorities, 1);
    assert_eq!(stats.active_priorities, 1);
    assert_eq!(stats.briefings, 0);
}

// --- cluster stage ---

#[tokio::test]
async fn cluster_with_no_articles_creates_nothing() {
    let (_dir, store) = open_test_store().await;
    let clusterer = Clusterer::new(&store, None, DEFAULT_DISTANCE_THRESHOLD);
    let result = clusterer.cluster_articles(PERIOD).await.unwrap();
    assert_eq!(result.storyline_count, 0);
    assert_eq!(result.article_count, 0);
}

#[tokio::test]
async fn single_article_becomes_briefly_noted() {
    let (_dir, store) = open_test_store().await;
    let id = insert_article(&store, "https://a.com", "Solo Article", Some("Content")).await;
    store
        .insert_triage(id, "relevant".to_string(), None, Vec::new(), None, 3)
        .await
        .unwrap();

    let clusterer = Clusterer::new(&store, None, DEFAULT_DISTANCE_THRESHOLD);
    let result = clusterer.cluster_articles(PERIOD).await.unwrap();
    assert_eq!(result.storyline_count, 1);
    assert_eq!(result.briefly_noted_count, 1);

    let storylines = store.storylines_for_period(PERIOD.to_string()).await.unwrap();
    assert_eq!(storylines.len(), 1);
    assert_eq!(storylines[0].label, BRIEFLY_NOTED_LABEL);
}

#[tokio::test]
async fn cluster_groups_similar_embeddings() {
    let (_dir, store) = open_test_store().await;
    for i in 0..3 {
        let id = insert_article(
            &store,
            &format!("https://example.com/ai-testing-{i}"),
            "AI-Powered Testing Framework: Revolution in QA",
            Some("How AI is transforming testing"),
        )
        .await;
        store
            .insert_triage(id, "relevant".to_string(), None, Vec::new(), None, 4)
            .await
            .unwrap();
    }
    let outlier = insert_article(
        &store,
        "https://example.com/crypto",
        "New Cryptocurrency Market Analysis",
        Some("Analysis of cryptocurrency markets"),
    )
    .await;
    store
        .insert_triage(outlier, "relevant".to_string(), None, Vec::new(), None, 2)
        .await
        .unwrap();

    let embedder = MockEmbedder {
        embeddings: vec![
            vec![1.0, 0.0, 0.0],
            vec![0.95, 0.05, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.0, 0.0, 1.0],
        ],
    };

    let clusterer = Clusterer::new(&store, Some(&embedder), 1.0);
    let result = clusterer.cluster_articles(PERIOD).await.unwrap();
    assert_eq!(result.article_count, 4);
    assert_eq!(result.storyline_count, 2);
    assert_eq!(result.briefly_noted_count, 1);

    let storylines = store.storylines_for_period(PERIOD.to_string()).await.unwrap();
    assert_eq!(storylines.len(), 2);
    assert_eq!(storylines[0].article_count, 3);
    assert_ne!(storylines[0].label, BRIEFLY_NOTED_LABEL);
    assert_eq!(storylines[1].label, BRIEFLY_NOTED_LABEL);
    assert_eq!(storylines[1].article_count, 1);
}

#[tokio::test]
async fn reclustering_replaces_storylines() {
    let (_dir, store) = open_test_store().await;
    let id = insert_article(&store, "https://a.com", "A", Some("Content")).await;
    store
        .insert_triage(id, "relevant".to_string(), None, Vec::new(), None, 3)
        .await
        .unwrap();

    let clusterer = Clusterer::new(&store, None, DEFAULT_DISTANCE_THRESHOLD);
    clusterer.cluster_articles(PERIOD).await.unwrap();
    clusterer.cluster_articles(PERIOD).await.unwrap();

    let storylines = store.storylines_for_period(PERIOD.to_string()).await.unwrap();
    assert_eq!(storylines.len(), 1);
}

#[tokio::test]
async fn cluster_without_embedder_fails_for_two_articles() {
    let (_dir, store) = open_test_store().await;
    for i in 0..2 {
        let id = insert_article(&store, &format!("https://a.com/{i}"), "Title", None).await;
        store
            .insert_triage(id, "relevant".to_string(), None, Vec::new(), None, 3)
            .await
            .unwrap();
    }

    let clusterer = Clusterer::new(&store, None, DEFAULT_DISTANCE_THRESHOLD);
    let err = clusterer.cluster_articles(PERIOD).await.unwrap_err();
    assert!(matches!(err, AppError::Provider(_)));
}

// --- synthesize stage ---

#[tokio::test]
async fn briefly_noted_bypasses_the_llm() {
    let (_dir, store) = open_test_store().await;
    let id = insert_article(&store, "https://a.com", "Solo Article", None).await;
    store
        .insert_triage(
            id,
            "relevant".to_string(),
            None,
            vec!["The key point".to_string()],
            None,
            3,
        )
        .await
        .unwrap();
    let sid = store
        .insert_storyline(PERIOD.to_string(), BRIEFLY_NOTED_LABEL.to_string(), vec![id])
        .await
        .unwrap();

    let generator = MockGenerator::new("should not be called");
    let synthesizer = Synthesizer::new(&store, Some(&generator));
    let result = synthesizer.synthesize_period(PERIOD).await;

    assert_eq!(result.narratives_created, 1);
    assert_eq!(result.errors, 0);
    assert_eq!(generator.call_count(), 0);

    let narrative = store.narrative_for_storyline(sid).await.unwrap().unwrap();
    assert_eq!(narrative.title, BRIEFLY_NOTED_LABEL);
    assert_eq!(
        narrative.narrative_text,
        "- **Solo Article** (Unknown): The key point"
    );
    assert_eq!(narrative.source_references.len(), 1);
}

#[tokio::test]
async fn storyline_narrative_from_parsed_json() {
    let (_dir, store) = open_test_store().await;
    let a = insert_article(&store, "https://a.com", "A", None).await;
    let b = insert_article(&store, "https://b.com", "B", None).await;
    let sid = store
        .insert_storyline(PERIOD.to_string(), "Agent Tools".to_string(), vec![a, b])
        .await
        .unwrap();

    let generator = MockGenerator::new(
        r#"{"title": "Agents Level Up", "narrative": "Two paragraphs here.",
            "source_references": [{"title": "A", "url": "https://a.com", "contribution": "context"}]}"#,
    );
    let synthesizer = Synthesizer::new(&store, Some(&generator));
    let result = synthesizer.synthesize_period(PERIOD).await;
    assert_eq!(result.narratives_created, 1);

    let narrative = store.narrative_for_storyline(sid).await.unwrap().unwrap();
    assert_eq!(narrative.title, "Agents Level Up");
    assert_eq!(narrative.narrative_text, "Two paragraphs here.");
    assert_eq!(narrative.source_references[0].contribution, "context");
}

#[tokio::test]
async fn unparseable_synthesis_keeps_raw_text_and_label() {
    let (_dir, store) = open_test_store().await;
    let a = insert_article(&store, "https://a.com", "A", None).await;
    let b = insert_article(&store, "https://b.com", "B", None).await;
    let sid = store
        .insert_storyline(PERIOD.to_string(), "Agent Tools".to_string(), vec![a, b])
        .await
        .unwrap();

    let generator = MockGenerator::new("Here is some prose, not JSON at all.");
    let synthesizer = Synthesizer::new(&store, Some(&generator));
    synthesizer.synthesize_period(PERIOD).await;

    let narrative = store.narrative_for_storyline(sid).await.unwrap().unwrap();
    assert_eq!(narrative.title, "Agent Tools");
    assert_eq!(narrative.narrative_text, "Here is some prose, not JSON at all.");
    // References derived from the article set, without contributions.
    assert_eq!(narrative.source_references.len(), 2);
    assert!(narrative.source_references[0].contribution.is_empty());
}

#[tokio::test]
async fn existing_narratives_are_not_regenerated() {
    let (_dir, store) = open_test_store().await;
    let a = insert_article(&store, "https://a.com", "A", None).await;
    let b = insert_article(&store, "https://b.com", "B", None).await;
    let sid = store
        .insert_storyline(PERIOD.to_string(), "Agent Tools".to_string(), vec![a, b])
        .await
        .unwrap();
    store
        .insert_narrative(
            sid,
            PERIOD.to_string(),
            "Existing".to_string(),
            "Kept".to_string(),
            Vec::new(),
        )
        .await
        .unwrap();

    let generator = MockGenerator::new(r#"{"title": "New", "narrative": "Replaced?"}"#);
    let synthesizer = Synthesizer::new(&store, Some(&generator));
    let result = synthesizer.synthesize_period(PERIOD).await;

    assert_eq!(result.narratives_created, 1);
    assert_eq!(generator.call_count(), 0);
    let narrative = store.narrative_for_storyline(sid).await.unwrap().unwrap();
    assert_eq!(narrative.title, "Existing");
}

// --- compose stage ---

#[tokio::test]
async fn compose_without_narratives_writes_sentinel() {
    let (_dir, store) = open_test_store().await;
    let generator = MockGenerator::new("unused");
    let composer = Composer::new(&store, Some(&generator));

    let briefing = composer.compose_briefing(PERIOD).await.unwrap();
    assert_eq!(briefing.tldr, "- No articles collected today.");
    assert_eq!(briefing.storyline_count, 0);
    assert_eq!(briefing.article_count, 0);
    assert_eq!(generator.call_count(), 0);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.briefings, 1);
}

async fn seed_two_storylines(store: &Store) {
    let a = insert_article(store, "https://a.com", "A", None).await;
    let b = insert_article(store, "https://b.com", "B", None).await;
    let c = insert_article(store, "https://c.com", "C", None).await;

    let s1 = store
        .insert_storyline(PERIOD.to_string(), "Agents Everywhere".to_string(), vec![a, b])
        .await
        .unwrap();
    store
        .insert_narrative(
            s1,
            PERIOD.to_string(),
            "Agents Everywhere".to_string(),
            "Narrative one.".to_string(),
            Vec::new(),
        )
        .await
        .unwrap();

    let s2 = store
        .insert_storyline(PERIOD.to_string(), BRIEFLY_NOTED_LABEL.to_string(), vec![c])
        .await
        .unwrap();
    store
        .insert_narrative(
            s2,
            PERIOD.to_string(),
            BRIEFLY_NOTED_LABEL.to_string(),
            "- **C** (Unknown): C".to_string(),
            Vec::new(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn compose_joins_tldr_bullets_from_json() {
    let (_dir, store) = open_test_store().await;
    seed_two_storylines(&store).await;

    let generator = MockGenerator::new(r#"{"tldr_bullets": ["First takeaway", "Second takeaway"]}"#);
    let composer = Composer::new(&store, Some(&generator));
    let briefing = composer.compose_briefing(PERIOD).await.unwrap();

    assert_eq!(briefing.tldr, "- First takeaway\n- Second takeaway");
    assert_eq!(briefing.storyline_count, 2);
    assert_eq!(briefing.article_count, 3);
    assert!(briefing.body_markdown.contains("## Agents Everywhere"));
    assert!(briefing.body_markdown.contains("## Briefly Noted"));
}

#[tokio::test]
async fn compose_empty_response_falls_back_to_titles() {
    let (_dir, store) = open_test_store().await;
    seed_two_storylines(&store).await;

    let generator = MockGenerator::new("");
    let composer = Composer::new(&store, Some(&generator));
    let briefing = composer.compose_briefing(PERIOD).await.unwrap();

    assert_eq!(briefing.tldr, "- Agents Everywhere");
}

#[tokio::test]
async fn compose_provider_error_falls_back_to_titles() {
    let (_dir, store) = open_test_store().await;
    seed_two_storylines(&store).await;

    let composer = Composer::new(&store, Some(&FailingGenerator));
    let briefing = composer.compose_briefing(PERIOD).await.unwrap();

    assert_eq!(briefing.tldr, "- Agents Everywhere");
}

// --- cross-stage idempotence ---

#[tokio::test]
async fn triage_cluster_synthesize_compose_twice_is_stable() {
    let (_dir, store) = open_test_store().await;
    for i in 0..3 {
        insert_article(
            &store,
            &format!("https://example.com/{i}"),
            "AI Agents Ship Faster Code Reviews",
            Some("Body text about agents reviewing code."),
        )
        .await;
    }
    insert_article(&store, "https://example.com/other", "Quantum Chips Update", None).await;

    let triage_generator = MockGenerator::new(
        r#"{"verdict": "relevant", "article_type": "technique",
            "key_points": ["agents"], "relevance_reason": "useful", "practical_score": 4}"#,
    );
    let embedder = MockEmbedder {
        embeddings: vec![
            vec![1.0, 0.0, 0.0],
            vec![0.98, 0.02, 0.0],
            vec![0.96, 0.04, 0.0],
            vec![0.0, 0.0, 1.0],
        ],
    };
    let narrative_generator = MockGenerator::new(
        r#"{"title": "Agents Review Code", "narrative": "The narrative.",
            "source_references": []}"#,
    );
    let tldr_generator = MockGenerator::new(r#"{"tldr_bullets": ["Agents review code now"]}"#);

    async fn run_once(
        store: &Store,
        triage_generator: &MockGenerator,
        embedder: &MockEmbedder,
        narrative_generator: &MockGenerator,
        tldr_generator: &MockGenerator,
    ) -> aicrawler::db::Briefing {
        Triager::new(store, Some(triage_generator))
            .triage_articles(PERIOD)
            .await;
        Clusterer::new(store, Some(embedder), 1.0)
            .cluster_articles(PERIOD)
            .await
            .unwrap();
        Synthesizer::new(store, Some(narrative_generator))
            .synthesize_period(PERIOD)
            .await;
        Composer::new(store, Some(tldr_generator))
            .compose_briefing(PERIOD)
            .await
            .unwrap()
    }

    let first = run_once(
        &store,
        &triage_generator,
        &embedder,
        &narrative_generator,
        &tldr_generator,
    )
    .await;
    let first_labels: Vec<String> = store
        .storylines_for_period(PERIOD.to_string())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.label)
        .collect();

    let second = run_once(
        &store,
        &triage_generator,
        &embedder,
        &narrative_generator,
        &tldr_generator,
    )
    .await;
    let second_labels: Vec<String> = store
        .storylines_for_period(PERIOD.to_string())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.label)
        .collect();

    assert_eq!(first.storyline_count, second.storyline_count);
    assert_eq!(first.article_count, second.article_count);
    assert_eq!(first_labels, second_labels);
    assert_eq!(first.tldr, second.tldr);

    // Triage ran once per article; the second pass found nothing untriaged.
    assert_eq!(triage_generator.call_count(), 4);
}
