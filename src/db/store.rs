use std::path::Path;

use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;

use super::migrations;
use super::models::{
    Article, ArticleTriage, Briefing, ResearchPriority, SourceReference, Stats, Storyline,
    StorylineNarrative, TriageStats,
};

/// Durable store for all pipeline entities. One connection, WAL journal,
/// foreign keys enforced; writes are serialized through `conn.call`.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            migrations::migrate(conn)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Article operations

    /// Inserts an article. Returns the new ID, or 0 when the URL already
    /// exists (duplicates are not an error).
    pub async fn insert_article(
        &self,
        url: String,
        title: String,
        source: Option<String>,
        published_date: Option<String>,
        content: Option<String>,
        period_id: String,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO articles (url, title, source, published_date, content, period_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![url, title, source, published_date, content, period_id],
                );
                match result {
                    Ok(_) => Ok(conn.last_insert_rowid()),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == ErrorCode::ConstraintViolation =>
                    {
                        Ok(0)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        Ok(id)
    }

    pub async fn articles_for_period(&self, period_id: String) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, url, title, source, published_date, content, content_fetched, period_id, collected_at
                     FROM articles WHERE period_id = ?1 ORDER BY collected_at DESC",
                )?;
                let articles = stmt
                    .query_map(params![period_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Articles with empty content that have not been fetch-attempted yet.
    pub async fn articles_needing_fetch(&self, period_id: Option<String>) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let base = "SELECT id, url, title, source, published_date, content, content_fetched, period_id, collected_at
                     FROM articles WHERE (content IS NULL OR content = '') AND content_fetched = 0";
                let articles = match period_id {
                    Some(pid) => {
                        let mut stmt = conn.prepare(&format!(
                            "{base} AND period_id = ?1 ORDER BY collected_at DESC"
                        ))?;
                        let rows = stmt
                            .query_map(params![pid], article_from_row)?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let mut stmt =
                            conn.prepare(&format!("{base} ORDER BY collected_at DESC"))?;
                        let rows = stmt
                            .query_map([], article_from_row)?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn update_article_content(&self, article_id: i64, content: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET content = ?1, content_fetched = 1 WHERE id = ?2",
                    params![content, article_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Marks that a fetch was attempted without storing content.
    pub async fn mark_article_fetch_attempted(&self, article_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET content_fetched = 1 WHERE id = ?1",
                    params![article_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn untriaged_articles(&self, period_id: Option<String>) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let base = "SELECT a.id, a.url, a.title, a.source, a.published_date, a.content,
                            a.content_fetched, a.period_id, a.collected_at
                     FROM articles a LEFT JOIN article_triage t ON a.id = t.article_id
                     WHERE t.article_id IS NULL";
                let articles = match period_id {
                    Some(pid) => {
                        let mut stmt = conn.prepare(&format!(
                            "{base} AND a.period_id = ?1 ORDER BY a.collected_at DESC"
                        ))?;
                        let rows = stmt
                            .query_map(params![pid], article_from_row)?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let mut stmt =
                            conn.prepare(&format!("{base} ORDER BY a.collected_at DESC"))?;
                        let rows = stmt
                            .query_map([], article_from_row)?
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Articles triaged as relevant for a period, best-scoring first.
    pub async fn relevant_articles(&self, period_id: String) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT a.id, a.url, a.title, a.source, a.published_date, a.content,
                            a.content_fetched, a.period_id, a.collected_at
                     FROM articles a JOIN article_triage t ON a.id = t.article_id
                     WHERE a.period_id = ?1 AND t.verdict = 'relevant'
                     ORDER BY t.practical_score DESC",
                )?;
                let articles = stmt
                    .query_map(params![period_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn article_by_id(&self, article_id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, url, title, source, published_date, content, content_fetched, period_id, collected_at
                     FROM articles WHERE id = ?1",
                )?;
                let article = stmt
                    .query_row(params![article_id], article_from_row)
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    // Triage operations

    /// Inserts or replaces the triage row for an article.
    pub async fn insert_triage(
        &self,
        article_id: i64,
        verdict: String,
        article_type: Option<String>,
        key_points: Vec<String>,
        relevance_reason: Option<String>,
        practical_score: i64,
    ) -> Result<()> {
        let kp_json = if key_points.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&key_points)?)
        };

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO article_triage
                     (article_id, verdict, article_type, key_points, relevance_reason, practical_score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        article_id,
                        verdict,
                        article_type,
                        kp_json,
                        relevance_reason,
                        practical_score
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn triage_for_article(&self, article_id: i64) -> Result<Option<ArticleTriage>> {
        let triage = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT article_id, verdict, article_type, key_points, relevance_reason, practical_score, triaged_at
                     FROM article_triage WHERE article_id = ?1",
                )?;
                let triage = stmt
                    .query_row(params![article_id], triage_from_row)
                    .optional()?;
                Ok(triage)
            })
            .await?;
        Ok(triage)
    }

    pub async fn triage_stats(&self, period_id: String) -> Result<TriageStats> {
        let stats = self
            .conn
            .call(move |conn| {
                let stats = conn.query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(CASE WHEN verdict = 'relevant' THEN 1 ELSE 0 END), 0),
                            COALESCE(SUM(CASE WHEN verdict = 'skip' THEN 1 ELSE 0 END), 0)
                     FROM article_triage t
                     JOIN articles a ON a.id = t.article_id
                     WHERE a.period_id = ?1",
                    params![period_id],
                    |row| {
                        Ok(TriageStats {
                            total: row.get(0)?,
                            relevant: row.get(1)?,
                            skipped: row.get(2)?,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }

    // Storyline operations

    /// Creates a storyline and its article links in one transaction.
    pub async fn insert_storyline(
        &self,
        period_id: String,
        label: String,
        article_ids: Vec<i64>,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO storylines (period_id, label, article_count) VALUES (?1, ?2, ?3)",
                    params![period_id, label, article_ids.len() as i64],
                )?;
                let storyline_id = tx.last_insert_rowid();
                for article_id in &article_ids {
                    tx.execute(
                        "INSERT INTO storyline_articles (storyline_id, article_id) VALUES (?1, ?2)",
                        params![storyline_id, article_id],
                    )?;
                }
                tx.commit()?;
                Ok(storyline_id)
            })
            .await?;
        Ok(id)
    }

    /// Storylines for a period, largest first.
    pub async fn storylines_for_period(&self, period_id: String) -> Result<Vec<Storyline>> {
        let storylines = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, period_id, label, article_count, created_at
                     FROM storylines WHERE period_id = ?1 ORDER BY article_count DESC",
                )?;
                let storylines = stmt
                    .query_map(params![period_id], |row| {
                        Ok(Storyline {
                            id: row.get(0)?,
                            period_id: row.get(1)?,
                            label: row.get(2)?,
                            article_count: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(storylines)
            })
            .await?;
        Ok(storylines)
    }

    pub async fn storyline_articles(&self, storyline_id: i64) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT a.id, a.url, a.title, a.source, a.published_date, a.content,
                            a.content_fetched, a.period_id, a.collected_at
                     FROM articles a JOIN storyline_articles sa ON a.id = sa.article_id
                     WHERE sa.storyline_id = ?1",
                )?;
                let articles = stmt
                    .query_map(params![storyline_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Removes a period's storylines, junction rows, and narratives so the
    /// clusterer can re-run from scratch.
    pub async fn clear_storylines_for_period(&self, period_id: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM storyline_articles WHERE storyline_id IN
                     (SELECT id FROM storylines WHERE period_id = ?1)",
                    params![period_id],
                )?;
                tx.execute(
                    "DELETE FROM storyline_narratives WHERE storyline_id IN
                     (SELECT id FROM storylines WHERE period_id = ?1)",
                    params![period_id],
                )?;
                tx.execute(
                    "DELETE FROM storylines WHERE period_id = ?1",
                    params![period_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Narrative operations

    pub async fn insert_narrative(
        &self,
        storyline_id: i64,
        period_id: String,
        title: String,
        narrative_text: String,
        source_references: Vec<SourceReference>,
    ) -> Result<i64> {
        let refs_json = if source_references.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&source_references)?)
        };

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO storyline_narratives
                     (storyline_id, period_id, title, narrative_text, source_references)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![storyline_id, period_id, title, narrative_text, refs_json],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Narratives for a period, ordered by their storyline's article count.
    pub async fn narratives_for_period(&self, period_id: String) -> Result<Vec<StorylineNarrative>> {
        let narratives = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT sn.id, sn.storyline_id, sn.period_id, sn.title, sn.narrative_text,
                            sn.source_references, sn.generated_at
                     FROM storyline_narratives sn
                     JOIN storylines s ON s.id = sn.storyline_id
                     WHERE sn.period_id = ?1
                     ORDER BY s.article_count DESC",
                )?;
                let narratives = stmt
                    .query_map(params![period_id], narrative_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(narratives)
            })
            .await?;
        Ok(narratives)
    }

    pub async fn narrative_for_storyline(
        &self,
        storyline_id: i64,
    ) -> Result<Option<StorylineNarrative>> {
        let narrative = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, storyline_id, period_id, title, narrative_text, source_references, generated_at
                     FROM storyline_narratives WHERE storyline_id = ?1",
                )?;
                let narrative = stmt
                    .query_row(params![storyline_id], narrative_from_row)
                    .optional()?;
                Ok(narrative)
            })
            .await?;
        Ok(narrative)
    }

    // Briefing + run report operations

    pub async fn insert_briefing(
        &self,
        period_id: String,
        tldr: String,
        body_markdown: String,
        storyline_count: i64,
        article_count: i64,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO briefings
                     (period_id, tldr, body_markdown, storyline_count, article_count)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![period_id, tldr, body_markdown, storyline_count, article_count],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn briefing(&self, period_id: String) -> Result<Option<Briefing>> {
        let briefing = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, period_id, tldr, body_markdown, storyline_count, article_count, generated_at
                     FROM briefings WHERE period_id = ?1",
                )?;
                let briefing = stmt
                    .query_row(params![period_id], briefing_from_row)
                    .optional()?;
                Ok(briefing)
            })
            .await?;
        Ok(briefing)
    }

    pub async fn all_briefings(&self) -> Result<Vec<Briefing>> {
        let briefings = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, period_id, tldr, body_markdown, storyline_count, article_count, generated_at
                     FROM briefings ORDER BY period_id DESC",
                )?;
                let briefings = stmt
                    .query_map([], briefing_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(briefings)
            })
            .await?;
        Ok(briefings)
    }

    pub async fn insert_report(
        &self,
        period_id: String,
        article_count: i64,
        storyline_count: i64,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO run_reports (period_id, article_count, storyline_count)
                     VALUES (?1, ?2, ?3)",
                    params![period_id, article_count, storyline_count],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// End date of the most recent run report, if any.
    pub async fn last_run_date(&self) -> Result<Option<String>> {
        let period_id: Option<String> = self
            .conn
            .call(|conn| {
                let period = conn
                    .query_row(
                        "SELECT period_id FROM run_reports ORDER BY period_id DESC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(period)
            })
            .await?;

        Ok(period_id.map(|p| super::period::period_end_date(&p).to_string()))
    }

    pub async fn stats(&self) -> Result<Stats> {
        let stats = self
            .conn
            .call(|conn| {
                let count = |sql: &str| -> rusqlite::Result<i64> {
                    conn.query_row(sql, [], |row| row.get(0))
                };
                Ok(Stats {
                    total_articles: count("SELECT COUNT(*) FROM articles")?,
                    triaged_articles: count("SELECT COUNT(*) FROM article_triage")?,
                    relevant_articles: count(
                        "SELECT COUNT(*) FROM article_triage WHERE verdict = 'relevant'",
                    )?,
                    periods_with_articles: count("SELECT COUNT(DISTINCT period_id) FROM articles")?,
                    briefings: count("SELECT COUNT(*) FROM briefings")?,
                    storylines: count("SELECT COUNT(*) FROM storylines")?,
                    total_priorities: count("SELECT COUNT(*) FROM research_priorities")?,
                    active_priorities: count(
                        "SELECT COUNT(*) FROM research_priorities WHERE is_active = 1",
                    )?,
                })
            })
            .await?;
        Ok(stats)
    }

    // Research priority operations

    pub async fn insert_priority(
        &self,
        title: String,
        description: String,
        keywords: Vec<String>,
    ) -> Result<i64> {
        let kw_json = if keywords.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&keywords)?)
        };

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO research_priorities (title, description, keywords) VALUES (?1, ?2, ?3)",
                    params![title, description, kw_json],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn all_priorities(&self) -> Result<Vec<ResearchPriority>> {
        self.query_priorities(
            "SELECT id, title, description, keywords, is_active, created_at, updated_at
             FROM research_priorities ORDER BY created_at DESC",
        )
        .await
    }

    pub async fn active_priorities(&self) -> Result<Vec<ResearchPriority>> {
        self.query_priorities(
            "SELECT id, title, description, keywords, is_active, created_at, updated_at
             FROM research_priorities WHERE is_active = 1 ORDER BY created_at DESC",
        )
        .await
    }

    pub async fn priority(&self, priority_id: i64) -> Result<Option<ResearchPriority>> {
        let priority = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, description, keywords, is_active, created_at, updated_at
                     FROM research_priorities WHERE id = ?1",
                )?;
                let priority = stmt
                    .query_row(params![priority_id], priority_from_row)
                    .optional()?;
                Ok(priority)
            })
            .await?;
        Ok(priority)
    }

    /// Partial update; only provided fields change, `updated_at` is bumped.
    pub async fn update_priority(
        &self,
        priority_id: i64,
        title: Option<String>,
        description: Option<String>,
        keywords: Option<Vec<String>>,
    ) -> Result<()> {
        let kw_json = match keywords {
            Some(kw) => Some(serde_json::to_string(&kw)?),
            None => None,
        };

        self.conn
            .call(move |conn| {
                let mut updates = Vec::new();
                let mut args: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

                if let Some(title) = title {
                    updates.push("title = ?");
                    args.push(Box::new(title));
                }
                if let Some(description) = description {
                    updates.push("description = ?");
                    args.push(Box::new(description));
                }
                if let Some(kw) = kw_json {
                    updates.push("keywords = ?");
                    args.push(Box::new(kw));
                }
                if updates.is_empty() {
                    return Ok(());
                }

                updates.push("updated_at = datetime('now')");
                args.push(Box::new(priority_id));

                let sql = format!(
                    "UPDATE research_priorities SET {} WHERE id = ?",
                    updates.join(", ")
                );
                let params = rusqlite::params_from_iter(args.iter().map(|a| a.as_ref() as &dyn rusqlite::ToSql));
                conn.execute(&sql, params)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn toggle_priority(&self, priority_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE research_priorities SET is_active = NOT is_active, updated_at = datetime('now') WHERE id = ?1",
                    params![priority_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_priority(&self, priority_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM research_priorities WHERE id = ?1",
                    params![priority_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn query_priorities(&self, sql: &'static str) -> Result<Vec<ResearchPriority>> {
        let priorities = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let priorities = stmt
                    .query_map([], priority_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(priorities)
            })
            .await?;
        Ok(priorities)
    }
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        source: row.get(3)?,
        published_date: row.get(4)?,
        content: row.get(5)?,
        content_fetched: row.get::<_, i64>(6)? != 0,
        period_id: row.get(7)?,
        collected_at: row.get(8)?,
    })
}

fn triage_from_row(row: &Row) -> rusqlite::Result<ArticleTriage> {
    let kp_json: Option<String> = row.get(3)?;
    Ok(ArticleTriage {
        article_id: row.get(0)?,
        verdict: row.get(1)?,
        article_type: row.get(2)?,
        // Malformed JSON degrades to empty, not an error.
        key_points: kp_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        relevance_reason: row.get(4)?,
        practical_score: row.get(5)?,
        triaged_at: row.get(6)?,
    })
}

fn narrative_from_row(row: &Row) -> rusqlite::Result<StorylineNarrative> {
    let refs_json: Option<String> = row.get(5)?;
    Ok(StorylineNarrative {
        id: row.get(0)?,
        storyline_id: row.get(1)?,
        period_id: row.get(2)?,
        title: row.get(3)?,
        narrative_text: row.get(4)?,
        source_references: refs_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        generated_at: row.get(6)?,
    })
}

fn briefing_from_row(row: &Row) -> rusqlite::Result<Briefing> {
    Ok(Briefing {
        id: row.get(0)?,
        period_id: row.get(1)?,
        tldr: row.get(2)?,
        body_markdown: row.get(3)?,
        storyline_count: row.get(4)?,
        article_count: row.get(5)?,
        generated_at: row.get(6)?,
    })
}

fn priority_from_row(row: &Row) -> rusqlite::Result<ResearchPriority> {
    let kw_json: Option<String> = row.get(3)?;
    Ok(ResearchPriority {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        keywords: kw_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
