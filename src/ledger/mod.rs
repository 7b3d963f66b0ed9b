//! Knowledge ledger storage using SQLite
//!
//! This module is the source of truth for:
//! - KB articles (upserted by ID, creation timestamp preserved)
//! - Lineage edges (append-only, deduplicated by the 4-tuple)
//! - Learning events (created by scanning/reporting, mutated only by review)

mod schema;

pub use schema::*;

use crate::draft::DraftPayload;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Review states of a learning event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Pending => write!(f, "Pending"),
            EventStatus::Approved => write!(f, "Approved"),
            EventStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EventStatus::Pending),
            "approved" => Ok(EventStatus::Approved),
            "rejected" => Ok(EventStatus::Rejected),
            _ => Err(Error::Validation(format!("Unknown event status: {}", s))),
        }
    }
}

/// A KB article row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KbArticleRow {
    pub kb_article_id: String,
    pub title: String,
    pub body: String,
    pub tags: String,
    pub module: String,
    pub category: String,
    pub source_type: String,
    pub created_at: String,
    pub updated_at: String,
}

impl KbArticleRow {
    /// Retrievable text for the KB partition (title + body)
    pub fn index_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

/// A provenance edge
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineageEdge {
    pub kb_article_id: String,
    pub source_id: String,
    pub source_type: String,
    pub relationship: String,
    pub created_at: String,
}

/// A learning event row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LearningEvent {
    pub event_id: String,
    pub ticket_number: String,
    pub conversation_id: String,
    pub detected_gap: String,
    pub proposed_kb_id: String,
    pub draft_summary: String,
    pub draft_json: Option<String>,
    pub source_question: String,
    pub reported_confidence: Option<f64>,
    pub best_kb_score: Option<f64>,
    pub best_kb_match: String,
    pub status: String,
    pub reviewer_role: String,
    pub review_notes: String,
    pub created_at: String,
    pub reviewed_at: Option<String>,
}

impl LearningEvent {
    /// Status parsed leniently: anything unrecognized counts as pending
    pub fn status_kind(&self) -> EventStatus {
        self.status.parse().unwrap_or(EventStatus::Pending)
    }

    /// Deserialize the stored draft, if any
    pub fn draft(&self) -> Option<DraftPayload> {
        self.draft_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

/// Counts per review status
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

/// Ledger database handle
#[derive(Clone)]
pub struct KnowledgeLedger {
    pool: SqlitePool,
}

impl KnowledgeLedger {
    /// Open (and auto-initialize) the ledger at the given path
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    // ===== KB Article Operations =====

    /// Insert or update an article by ID. The original creation timestamp is
    /// preserved on update.
    pub async fn upsert_article(&self, article: &KbArticleRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kb_articles (kb_article_id, title, body, tags, module, category, source_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kb_article_id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                tags = excluded.tags,
                module = excluded.module,
                category = excluded.category,
                source_type = excluded.source_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&article.kb_article_id)
        .bind(&article.title)
        .bind(&article.body)
        .bind(&article.tags)
        .bind(&article.module)
        .bind(&article.category)
        .bind(&article.source_type)
        .bind(&article.created_at)
        .bind(&article.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert an article only if absent (corpus seeding)
    pub async fn seed_article(&self, article: &KbArticleRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO kb_articles (kb_article_id, title, body, tags, module, category, source_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.kb_article_id)
        .bind(&article.title)
        .bind(&article.body)
        .bind(&article.tags)
        .bind(&article.module)
        .bind(&article.category)
        .bind(&article.source_type)
        .bind(&article.created_at)
        .bind(&article.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get article by ID
    pub async fn get_article(&self, article_id: &str) -> Result<Option<KbArticleRow>> {
        let article =
            sqlx::query_as::<_, KbArticleRow>("SELECT * FROM kb_articles WHERE kb_article_id = ?")
                .bind(article_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(article)
    }

    /// List all articles
    pub async fn list_articles(&self) -> Result<Vec<KbArticleRow>> {
        let articles =
            sqlx::query_as::<_, KbArticleRow>("SELECT * FROM kb_articles ORDER BY kb_article_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(articles)
    }

    /// Count stored articles
    pub async fn count_articles(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kb_articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// All identifiers that participate in KB sequence allocation: stored
    /// article IDs plus every event's proposed ID, so aborted or pending
    /// drafts never collide with finalized articles.
    pub async fn kb_sequence_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT kb_article_id FROM kb_articles
            UNION ALL
            SELECT proposed_kb_id FROM learning_events WHERE proposed_kb_id != ''
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    // ===== Lineage Operations =====

    /// Append lineage edges, skipping duplicates. Returns the number of
    /// edges actually inserted.
    pub async fn append_lineage(&self, edges: &[LineageEdge]) -> Result<usize> {
        let mut inserted = 0usize;
        for edge in edges {
            if edge.source_id.is_empty() {
                continue;
            }
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO kb_lineage (kb_article_id, source_id, source_type, relationship, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&edge.kb_article_id)
            .bind(&edge.source_id)
            .bind(&edge.source_type)
            .bind(&edge.relationship)
            .bind(&edge.created_at)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    /// Lineage edges for an article
    pub async fn lineage_for(&self, article_id: &str) -> Result<Vec<LineageEdge>> {
        let edges = sqlx::query_as::<_, LineageEdge>(
            "SELECT * FROM kb_lineage WHERE kb_article_id = ? ORDER BY source_id",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(edges)
    }

    /// Count stored lineage edges
    pub async fn count_lineage(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kb_lineage")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    // ===== Learning Event Operations =====

    /// Insert a new event
    pub async fn insert_event(&self, event: &LearningEvent) -> Result<()> {
        self.write_event(event, false).await
    }

    /// Insert an event only if absent (corpus seeding)
    pub async fn seed_event(&self, event: &LearningEvent) -> Result<()> {
        self.write_event(event, true).await
    }

    async fn write_event(&self, event: &LearningEvent, ignore_existing: bool) -> Result<()> {
        let verb = if ignore_existing { "INSERT OR IGNORE" } else { "INSERT" };
        let sql = format!(
            r#"
            {verb} INTO learning_events (
                event_id, ticket_number, conversation_id, detected_gap, proposed_kb_id,
                draft_summary, draft_json, source_question, reported_confidence,
                best_kb_score, best_kb_match, status, reviewer_role, review_notes,
                created_at, reviewed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        );
        sqlx::query(&sql)
            .bind(&event.event_id)
            .bind(&event.ticket_number)
            .bind(&event.conversation_id)
            .bind(&event.detected_gap)
            .bind(&event.proposed_kb_id)
            .bind(&event.draft_summary)
            .bind(&event.draft_json)
            .bind(&event.source_question)
            .bind(event.reported_confidence)
            .bind(event.best_kb_score)
            .bind(&event.best_kb_match)
            .bind(&event.status)
            .bind(&event.reviewer_role)
            .bind(&event.review_notes)
            .bind(&event.created_at)
            .bind(&event.reviewed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get event by ID
    pub async fn get_event(&self, event_id: &str) -> Result<Option<LearningEvent>> {
        let event =
            sqlx::query_as::<_, LearningEvent>("SELECT * FROM learning_events WHERE event_id = ?")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(event)
    }

    /// List events, optionally filtered by status
    pub async fn list_events(&self, status: Option<EventStatus>) -> Result<Vec<LearningEvent>> {
        let events = match status {
            Some(status) => {
                sqlx::query_as::<_, LearningEvent>(
                    "SELECT * FROM learning_events WHERE status = ? ORDER BY created_at, event_id",
                )
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LearningEvent>(
                    "SELECT * FROM learning_events ORDER BY created_at, event_id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(events)
    }

    /// Count all events
    pub async fn count_events(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM learning_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Event IDs already allocated (for per-channel sequence computation)
    pub async fn event_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT event_id FROM learning_events")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Ticket numbers that already have a learning event
    pub async fn event_ticket_numbers(&self) -> Result<HashSet<String>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT ticket_number FROM learning_events WHERE ticket_number != ''",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(numbers.into_iter().collect())
    }

    /// Per-status event counts; unknown statuses count as pending
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM learning_events GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.to_lowercase().as_str() {
                "approved" => counts.approved += count as usize,
                "rejected" => counts.rejected += count as usize,
                _ => counts.pending += count as usize,
            }
        }
        Ok(counts)
    }

    /// Attach a generated draft to an event
    pub async fn update_event_draft(
        &self,
        event_id: &str,
        draft_json: &str,
        draft_summary: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE learning_events SET draft_json = ?, draft_summary = ? WHERE event_id = ?",
        )
        .bind(draft_json)
        .bind(draft_summary)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Learning event {}", event_id)));
        }
        Ok(())
    }

    /// Persist the outcome of a review transition. This is the single write
    /// that changes an event's status; everything else about the event is
    /// frozen once the status leaves Pending.
    pub async fn finalize_review(&self, event: &LearningEvent) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE learning_events SET
                proposed_kb_id = ?,
                draft_summary = ?,
                draft_json = ?,
                status = ?,
                reviewer_role = ?,
                review_notes = ?,
                reviewed_at = ?
            WHERE event_id = ?
            "#,
        )
        .bind(&event.proposed_kb_id)
        .bind(&event.draft_summary)
        .bind(&event.draft_json)
        .bind(&event.status)
        .bind(&event.reviewer_role)
        .bind(&event.review_notes)
        .bind(&event.reviewed_at)
        .bind(&event.event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Current UTC timestamp in RFC 3339 form
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
