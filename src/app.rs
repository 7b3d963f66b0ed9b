//! Application context
//!
//! One struct owns every shared component: corpus, ledger, index, optional
//! generator, and the review workflow. It is constructed once at startup and
//! passed by reference to command handlers; there is no process-global state.

use crate::config::Config;
use crate::corpus::{Corpus, ScriptRecord, TicketRecord};
use crate::embed::create_embedder;
use crate::error::{Error, Result};
use crate::generate::{create_generator, TextGenerator};
use crate::index::{truncate_graphemes, DocType, IndexDocument, MemoryIndex, QdrantIndex, SemanticIndex};
use crate::ledger::{now_rfc3339, KbArticleRow, KnowledgeLedger, LearningEvent, LineageEdge};
use crate::review::ReviewWorkflow;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Shared application state, built once at startup
pub struct AppContext {
    pub config: Config,
    pub corpus: Arc<Corpus>,
    pub ledger: KnowledgeLedger,
    pub index: Arc<dyn SemanticIndex>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub workflow: ReviewWorkflow,
}

impl AppContext {
    /// Load the corpus, open and seed the ledger, build the index, and wire
    /// the review workflow. Bulk indexing is idempotent, so restarting is
    /// cheap once the index backend is populated.
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let corpus = Arc::new(Corpus::load(&config.data_path)?);
        let ledger = KnowledgeLedger::connect(&config.paths.db_file).await?;

        seed_ledger(&ledger, &corpus).await?;

        let embedder = create_embedder(&config.embedding)?;
        let index: Arc<dyn SemanticIndex> = match config.index.backend.as_str() {
            "memory" => Arc::new(MemoryIndex::new(
                embedder,
                config.embedding.batch_size,
                config.retrieval.snippet_max_chars,
            )),
            "qdrant" => Arc::new(QdrantIndex::connect(
                &config.index.qdrant_url,
                &config.index.collection_prefix,
                embedder,
                config.embedding.batch_size,
                config.retrieval.snippet_max_chars,
            )?),
            other => return Err(Error::Config(format!("Unknown index backend: {}", other))),
        };
        index.ensure_ready().await?;

        // KB articles come from the ledger so previously approved articles
        // survive restarts; scripts and tickets come straight from the corpus.
        let max_chars = config.retrieval.document_max_chars;
        let kb_docs: Vec<IndexDocument> = ledger
            .list_articles()
            .await?
            .iter()
            .map(|article| kb_document(article, max_chars))
            .collect();
        let script_docs: Vec<IndexDocument> =
            corpus.scripts.iter().map(|s| script_document(s, max_chars)).collect();
        let ticket_docs: Vec<IndexDocument> =
            corpus.tickets.iter().map(|t| ticket_document(t, max_chars)).collect();

        let kb_count = index.bulk_index(DocType::KbArticle, kb_docs).await?;
        let script_count = index.bulk_index(DocType::Script, script_docs).await?;
        let ticket_count = index.bulk_index(DocType::Ticket, ticket_docs).await?;

        let generator = create_generator(&config.generation)?;

        let workflow = ReviewWorkflow::new(
            ledger.clone(),
            index.clone(),
            corpus.clone(),
            &config.retrieval.kb_id_prefix,
            max_chars,
        );

        info!(
            "Ready: {} KB articles, {} scripts, {} tickets indexed",
            kb_count, script_count, ticket_count
        );

        Ok(Self {
            config,
            corpus,
            ledger,
            index,
            generator,
            workflow,
        })
    }

    /// Borrow the generator as a trait object, if configured
    pub fn generator(&self) -> Option<&dyn TextGenerator> {
        self.generator.as_deref()
    }
}

/// Seed the ledger from the corpus sheets. All inserts ignore existing rows,
/// so reruns never clobber reviewed content.
async fn seed_ledger(ledger: &KnowledgeLedger, corpus: &Corpus) -> Result<()> {
    for article in &corpus.kb_articles {
        let created_at = if article.created_at.is_empty() {
            now_rfc3339()
        } else {
            article.created_at.clone()
        };
        ledger
            .seed_article(&KbArticleRow {
                kb_article_id: article.kb_article_id.clone(),
                title: article.title.clone(),
                body: article.body.clone(),
                tags: article.tags.clone(),
                module: article.module.clone(),
                category: article.category.clone(),
                source_type: article.source_type.clone(),
                created_at: created_at.clone(),
                updated_at: created_at,
            })
            .await?;
    }

    let edges: Vec<LineageEdge> = corpus
        .lineage
        .iter()
        .map(|row| LineageEdge {
            kb_article_id: row.kb_article_id.clone(),
            source_id: row.source_id.clone(),
            source_type: row.source_type.clone(),
            relationship: row.relationship.clone(),
            created_at: now_rfc3339(),
        })
        .collect();
    ledger.append_lineage(&edges).await?;

    for row in &corpus.learning_events {
        ledger
            .seed_event(&LearningEvent {
                event_id: row.event_id.clone(),
                ticket_number: row.ticket_number.clone(),
                conversation_id: row.conversation_id.clone(),
                detected_gap: row.detected_gap.clone(),
                proposed_kb_id: row.proposed_kb_id.clone(),
                draft_summary: row.draft_summary.clone(),
                draft_json: None,
                source_question: String::new(),
                reported_confidence: None,
                best_kb_score: None,
                best_kb_match: String::new(),
                status: if row.status.is_empty() {
                    "Pending".to_string()
                } else {
                    row.status.clone()
                },
                reviewer_role: row.reviewer_role.clone(),
                review_notes: String::new(),
                created_at: if row.timestamp.is_empty() {
                    now_rfc3339()
                } else {
                    row.timestamp.clone()
                },
                reviewed_at: None,
            })
            .await?;
    }

    Ok(())
}

fn kb_document(article: &KbArticleRow, max_chars: usize) -> IndexDocument {
    let text = article.index_text();
    IndexDocument::new(
        article.kb_article_id.clone(),
        truncate_graphemes(&text, max_chars),
        crate::index::kb_metadata(&article.title, &article.module, &article.category, &article.source_type),
    )
}

fn script_document(script: &ScriptRecord, max_chars: usize) -> IndexDocument {
    let text = script.index_text();
    let mut meta = Map::new();
    meta.insert("title".to_string(), Value::String(truncate_graphemes(&script.title, 500).to_string()));
    meta.insert("module".to_string(), Value::String(script.module.clone()));
    meta.insert("category".to_string(), Value::String(script.category.clone()));
    meta.insert("doc_type".to_string(), Value::String(DocType::Script.to_string()));
    IndexDocument::new(script.script_id.clone(), truncate_graphemes(&text, max_chars), meta)
}

fn ticket_document(ticket: &TicketRecord, max_chars: usize) -> IndexDocument {
    let text = ticket.index_text();
    let mut meta = Map::new();
    meta.insert("title".to_string(), Value::String(truncate_graphemes(&ticket.subject, 500).to_string()));
    meta.insert("module".to_string(), Value::String(ticket.module.clone()));
    meta.insert("category".to_string(), Value::String(ticket.category.clone()));
    meta.insert(
        "tier".to_string(),
        Value::String(ticket.tier.map(|t| t.to_string()).unwrap_or_default()),
    );
    meta.insert("status".to_string(), Value::String(ticket.status.clone()));
    meta.insert("doc_type".to_string(), Value::String(DocType::Ticket.to_string()));
    IndexDocument::new(ticket.ticket_number.clone(), truncate_graphemes(&text, max_chars), meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copilot::{self, AnswerKind, AskOptions};
    use crate::gaps;
    use serde_json::json;
    use tempfile::TempDir;

    async fn bootstrap_test_context(tmp: &TempDir) -> AppContext {
        let data_path = tmp.path().join("corpus.json");
        std::fs::write(
            &data_path,
            serde_json::to_string(&json!({
                "Tickets": [{
                    "Ticket_Number": "T-100",
                    "Subject": "Cache corruption on sync",
                    "Description": "Tenant ledger shows stale balances after nightly sync",
                    "Resolution": "Reset the cache",
                    "Status": "Closed",
                    "Tier": 3
                }],
                "Conversations": [],
                "Scripts_Master": [{
                    "Script_ID": "SCR-001",
                    "Script_Title": "Export invoices",
                    "Script_Purpose": "Exports monthly invoices to archive storage"
                }],
                "Knowledge_Articles": [{
                    "KB_Article_ID": "KB-SYN-0002",
                    "Title": "Password recovery walkthrough",
                    "Body": "Use our self-service portal to send customers a new sign-in link.",
                    "Created_At": "2024-01-01T00:00:00Z"
                }],
                "KB_Lineage": [],
                "Learning_Events": []
            }))
            .unwrap(),
        )
        .unwrap();

        let mut config = Config::default();
        config.data_path = data_path;
        config.paths.db_file = tmp.path().join("ledger.db");
        config.generation.backend = "none".to_string();
        AppContext::bootstrap(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_and_indexes() {
        let tmp = TempDir::new().unwrap();
        let ctx = bootstrap_test_context(&tmp).await;

        assert_eq!(ctx.ledger.count_articles().await.unwrap(), 1);
        assert_eq!(ctx.index.count(DocType::KbArticle).await.unwrap(), 1);
        assert_eq!(ctx.index.count(DocType::Script).await.unwrap(), 1);
        assert_eq!(ctx.index.count(DocType::Ticket).await.unwrap(), 1);
        assert!(ctx.generator().is_none());
    }

    /// The complete self-learning loop: detect the gap for T-100, approve
    /// its event, and retrieve the resulting article as the top KB hit.
    #[tokio::test]
    async fn test_learning_loop_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let ctx = bootstrap_test_context(&tmp).await;
        let threshold = ctx.config.retrieval.similarity_threshold;

        // T-100 resolves far from the only KB article, so it is a gap
        let found = gaps::detect_gaps(
            &ctx.corpus.tickets,
            ctx.index.as_ref(),
            threshold,
            ctx.config.retrieval.gap_query_max_chars,
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ticket_number, "T-100");
        assert!(found[0].best_kb_score < threshold);

        let scan = ctx.workflow.record_gaps(&found, threshold).await.unwrap();
        assert_eq!(scan.new_events.len(), 1);
        let event_id = scan.new_events[0].event_id.clone();
        // KB-SYN-0002 exists in the corpus, so the sequence continues at 3
        assert_eq!(scan.new_events[0].proposed_kb_id, "KB-SYN-0003");

        let outcome = ctx.workflow.approve(&event_id, None, None, "ship it").await.unwrap();
        assert_eq!(outcome.article_id, "KB-SYN-0003");

        let edges = ctx.ledger.lineage_for("KB-SYN-0003").await.unwrap();
        assert!(edges
            .iter()
            .any(|e| e.source_type == "Ticket" && e.source_id == "T-100" && e.relationship == "CREATED_FROM"));

        // The approved article is now the top KB hit for its own topic
        let answer = copilot::answer(
            ctx.index.as_ref(),
            ctx.generator(),
            "stale balances after nightly sync cache",
            &AskOptions {
                include_scripts: false,
                include_tickets: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(answer.answer_type, AnswerKind::Kb);
        assert_eq!(answer.sources[0].id, "KB-SYN-0003");
    }

    /// Restart against the same ledger: seeding and bulk indexing are both
    /// idempotent, and approved articles come back searchable.
    #[tokio::test]
    async fn test_restart_preserves_approved_articles()  {
        let tmp = TempDir::new().unwrap();
        {
            let ctx = bootstrap_test_context(&tmp).await;
            let event = ctx.workflow.report_gap("Where are audit logs kept?", 0.1, None).await.unwrap();
            ctx.workflow
                .approve(&event.event_id, Some("Audit log locations"), Some("Under Settings > Audit."), "")
                .await
                .unwrap();
        }

        let ctx = bootstrap_test_context(&tmp).await;
        // 1 corpus article + 1 approved article, not duplicated by re-seeding
        assert_eq!(ctx.ledger.count_articles().await.unwrap(), 2);
        assert_eq!(ctx.index.count(DocType::KbArticle).await.unwrap(), 2);

        let counts = ctx.ledger.status_counts().await.unwrap();
        assert_eq!(counts.approved, 1);
    }
}
