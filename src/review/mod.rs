//! Human-in-the-loop review workflow
//!
//! This module is the sole transition function for learning-event status and
//! the sole writer of lineage edges. The approval transition orders its side
//! effects so that searchable content always exists before an approval is
//! recorded: index first, then KB upsert, then lineage, then the status flip.
//! Any failure before the final step leaves the event exactly as it was.

use crate::corpus::Corpus;
use crate::draft::{DraftPayload, LineageSource};
use crate::error::{Error, Result};
use crate::gaps::GapCandidate;
use crate::index::{kb_metadata, round_score, truncate_graphemes, DocType, IndexDocument, SemanticIndex};
use crate::ledger::{now_rfc3339, EventStatus, KbArticleRow, KnowledgeLedger, LearningEvent, LineageEdge};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Source-type labels on lineage edges
pub const SOURCE_TICKET: &str = "Ticket";
pub const SOURCE_CONVERSATION: &str = "Conversation";
pub const SOURCE_SCRIPT: &str = "Script";
pub const SOURCE_COPILOT: &str = "Copilot";

/// Relationship labels on lineage edges
pub const REL_CREATED_FROM: &str = "CREATED_FROM";
pub const REL_REFERENCES: &str = "REFERENCES";
pub const REL_REPORTED_FROM: &str = "REPORTED_FROM";

/// Event ID prefixes per source channel
const EVENT_PREFIX_SCAN: &str = "LEARN-AUTO";
const EVENT_PREFIX_COPILOT: &str = "LEARN-COPILOT";

const REVIEWER_ROLE: &str = "Human Reviewer";

/// Result of an approval transition
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalOutcome {
    pub event: LearningEvent,
    pub article_id: String,
    pub kb_total_after: usize,
}

/// Result of recording a gap scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub new_events: Vec<LearningEvent>,
    pub total_events: usize,
}

/// Review workflow over the ledger and the document index
pub struct ReviewWorkflow {
    ledger: KnowledgeLedger,
    index: Arc<dyn SemanticIndex>,
    corpus: Arc<Corpus>,
    kb_id_prefix: String,
    document_max_chars: usize,
    // Approvals read-modify-write the sequence counter and the KB table;
    // interleaved approvals would race on both, so the transition is
    // serialized process-wide.
    approval_gate: Mutex<()>,
}

impl ReviewWorkflow {
    pub fn new(
        ledger: KnowledgeLedger,
        index: Arc<dyn SemanticIndex>,
        corpus: Arc<Corpus>,
        kb_id_prefix: &str,
        document_max_chars: usize,
    ) -> Self {
        Self {
            ledger,
            index,
            corpus,
            kb_id_prefix: kb_id_prefix.to_string(),
            document_max_chars,
            approval_gate: Mutex::new(()),
        }
    }

    /// Next numeric suffix for generated KB IDs, computed fresh on every
    /// call over both stored articles and all events' proposed IDs.
    pub async fn next_kb_sequence(&self) -> Result<u32> {
        let ids = self.ledger.kb_sequence_ids().await?;
        Ok(max_numeric_suffix(&self.kb_id_prefix, &ids) + 1)
    }

    fn format_kb_id(&self, sequence: u32) -> String {
        format!("{}-{:04}", self.kb_id_prefix, sequence)
    }

    async fn next_event_id(&self, prefix: &str) -> Result<String> {
        let ids = self.ledger.event_ids().await?;
        Ok(format!("{}-{:04}", prefix, max_numeric_suffix(prefix, &ids) + 1))
    }

    /// Approve a learning event: allocate its KB ID if needed, resolve final
    /// content, index it, upsert the KB record, append lineage, then flip the
    /// status. Indexing failures abort the transition with the event
    /// untouched.
    pub async fn approve(
        &self,
        event_id: &str,
        edited_title: Option<&str>,
        edited_body: Option<&str>,
        reviewer_notes: &str,
    ) -> Result<ApprovalOutcome> {
        let _guard = self.approval_gate.lock().await;

        let mut event = self
            .ledger
            .get_event(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Learning event {}", event_id)))?;

        let ticket = non_empty(&event.ticket_number).and_then(|t| self.corpus.ticket(t));
        let draft = event.draft().unwrap_or_default();

        // 1. Allocate a KB ID unless one was proposed earlier. Not persisted
        //    until the final event update, so an aborted approval leaves no
        //    trace.
        let article_id = match non_empty(&event.proposed_kb_id) {
            Some(id) => id.to_string(),
            None => self.format_kb_id(self.next_kb_sequence().await?),
        };

        // 2. Resolve final content: explicit edits win over the stored
        //    draft, which wins over what the event itself recorded.
        let title = first_non_empty(&[
            edited_title.unwrap_or_default(),
            &draft.title,
            &event.draft_summary,
            &event.detected_gap,
        ])
        .map(str::to_string)
        .unwrap_or_else(|| format!("Knowledge Article {}", article_id));

        let body = first_non_empty(&[edited_body.unwrap_or_default(), &draft.body])
            .map(str::to_string)
            .unwrap_or_else(|| match ticket {
                Some(ticket) => format!(
                    "## Problem\n{}\n\n## Resolution\n{}",
                    ticket.description, ticket.resolution
                ),
                None => format!(
                    "## Problem\n{}\n\n## Resolution\n{}",
                    event.detected_gap,
                    non_empty(reviewer_notes).unwrap_or("TBD")
                ),
            });

        let tags = first_non_empty(&[&draft.tags, ticket.map(|t| t.tags.as_str()).unwrap_or("")])
            .unwrap_or_default()
            .to_string();
        let module = ticket.map(|t| t.module.clone()).unwrap_or_default();
        let category = ticket.map(|t| t.category.clone()).unwrap_or_default();
        let source_type = if ticket.is_some() { "generated" } else { "copilot" };

        // 3. Index first. Approval must never be recorded without the
        //    corresponding searchable content existing.
        let text = format!("{}\n{}", title, body);
        let document = IndexDocument::new(
            article_id.clone(),
            truncate_graphemes(&text, self.document_max_chars),
            kb_metadata(&title, &module, &category, source_type),
        );
        if let Err(e) = self.index.upsert(DocType::KbArticle, document).await {
            warn!("Failed to index KB article {}: {}", article_id, e);
            return Err(Error::Indexing(format!("article {}: {}", article_id, e)));
        }

        // 4. Upsert the KB record; creation timestamp survives updates.
        let now = now_rfc3339();
        self.ledger
            .upsert_article(&KbArticleRow {
                kb_article_id: article_id.clone(),
                title: title.clone(),
                body: body.clone(),
                tags: tags.clone(),
                module,
                category,
                source_type: source_type.to_string(),
                created_at: now.clone(),
                updated_at: now.clone(),
            })
            .await?;

        // 5. Append the lineage edge set, deduplicated by the 4-tuple.
        let conversation_id = first_non_empty(&[&draft.source_conversation, &event.conversation_id])
            .unwrap_or_default()
            .to_string();
        let script_id = first_non_empty(&[
            &draft.source_script,
            ticket.map(|t| t.script_id.as_str()).unwrap_or(""),
        ])
        .unwrap_or_default()
        .to_string();

        let mut sources: Vec<LineageSource> = Vec::new();
        if let Some(ticket_number) = non_empty(&event.ticket_number) {
            sources.push(lineage_source(SOURCE_TICKET, ticket_number, REL_CREATED_FROM));
        }
        if !conversation_id.is_empty() {
            sources.push(lineage_source(SOURCE_CONVERSATION, &conversation_id, REL_CREATED_FROM));
        }
        if !script_id.is_empty() {
            sources.push(lineage_source(SOURCE_SCRIPT, &script_id, REL_REFERENCES));
        }
        if non_empty(&event.ticket_number).is_none() {
            sources.push(lineage_source(SOURCE_COPILOT, &event.event_id, REL_REPORTED_FROM));
        }

        let edges: Vec<LineageEdge> = sources
            .iter()
            .map(|s| LineageEdge {
                kb_article_id: article_id.clone(),
                source_id: s.source_id.clone(),
                source_type: s.source_type.clone(),
                relationship: s.relationship.clone(),
                created_at: now.clone(),
            })
            .collect();
        self.ledger.append_lineage(&edges).await?;

        // 6. Only now does the event become Approved.
        let resolved_draft = DraftPayload {
            title: title.clone(),
            body,
            tags,
            source_ticket: event.ticket_number.clone(),
            source_conversation: conversation_id,
            source_script: script_id,
            lineage: sources,
        };
        event.proposed_kb_id = article_id.clone();
        event.draft_json = Some(serde_json::to_string(&resolved_draft)?);
        event.draft_summary = title;
        event.status = EventStatus::Approved.to_string();
        event.reviewer_role = REVIEWER_ROLE.to_string();
        event.review_notes = reviewer_notes.to_string();
        event.reviewed_at = Some(now);
        self.ledger.finalize_review(&event).await?;

        info!("Approved event {} as article {}", event_id, article_id);

        Ok(ApprovalOutcome {
            event,
            article_id,
            kb_total_after: self.ledger.count_articles().await?,
        })
    }

    /// Reject a learning event. Updates status and reviewer metadata only;
    /// no index or KB mutation happens.
    pub async fn reject(&self, event_id: &str, reviewer_notes: &str) -> Result<LearningEvent> {
        let mut event = self
            .ledger
            .get_event(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Learning event {}", event_id)))?;

        event.status = EventStatus::Rejected.to_string();
        event.reviewer_role = REVIEWER_ROLE.to_string();
        event.review_notes = reviewer_notes.to_string();
        event.reviewed_at = Some(now_rfc3339());
        self.ledger.finalize_review(&event).await?;

        info!("Rejected event {}", event_id);
        Ok(event)
    }

    /// Record detected gaps as pending learning events, skipping tickets
    /// that already have one. Proposed KB IDs are allocated consecutively
    /// from one fresh sequence read.
    pub async fn record_gaps(&self, gaps: &[GapCandidate], threshold: f32) -> Result<ScanOutcome> {
        let existing_tickets = self.ledger.event_ticket_numbers().await?;
        let mut kb_sequence = self.next_kb_sequence().await?;
        let event_ids = self.ledger.event_ids().await?;
        let mut event_sequence = max_numeric_suffix(EVENT_PREFIX_SCAN, &event_ids) + 1;

        let mut new_events = Vec::new();
        for gap in gaps {
            if existing_tickets.contains(&gap.ticket_number) {
                continue;
            }

            let event = LearningEvent {
                event_id: format!("{}-{:04}", EVENT_PREFIX_SCAN, event_sequence),
                ticket_number: gap.ticket_number.clone(),
                conversation_id: self
                    .corpus
                    .conversation_for_ticket(&gap.ticket_number)
                    .map(|c| c.conversation_id.clone())
                    .unwrap_or_default(),
                detected_gap: format!(
                    "No KB match above {:.0}% for: {}",
                    threshold * 100.0,
                    truncate_graphemes(&gap.subject, 100)
                ),
                proposed_kb_id: self.format_kb_id(kb_sequence),
                draft_summary: format!("Auto-detected gap for: {}", gap.subject),
                draft_json: None,
                source_question: String::new(),
                reported_confidence: None,
                best_kb_score: Some(round_score(gap.best_kb_score) as f64),
                best_kb_match: gap.best_kb_match.clone().unwrap_or_default(),
                status: EventStatus::Pending.to_string(),
                reviewer_role: String::new(),
                review_notes: String::new(),
                created_at: now_rfc3339(),
                reviewed_at: None,
            };
            self.ledger.insert_event(&event).await?;
            kb_sequence += 1;
            event_sequence += 1;
            new_events.push(event);
        }

        info!("Gap scan recorded {} new learning events", new_events.len());
        Ok(ScanOutcome {
            new_events,
            total_events: self.ledger.count_events().await?,
        })
    }

    /// Create a pending learning event for a low-confidence copilot question
    pub async fn report_gap(
        &self,
        question: &str,
        confidence: f32,
        conversation_id: Option<&str>,
    ) -> Result<LearningEvent> {
        if question.trim().is_empty() {
            return Err(Error::Validation("No question provided".to_string()));
        }

        let event_id = self.next_event_id(EVENT_PREFIX_COPILOT).await?;
        let event = LearningEvent {
            event_id: event_id.clone(),
            ticket_number: String::new(),
            conversation_id: conversation_id
                .and_then(non_empty)
                .map(str::to_string)
                .unwrap_or_else(|| format!("COPILOT-{}", event_id)),
            detected_gap: format!(
                "Copilot low confidence ({:.0}%) on: {}",
                confidence * 100.0,
                truncate_graphemes(question, 200)
            ),
            proposed_kb_id: self.format_kb_id(self.next_kb_sequence().await?),
            draft_summary: format!(
                "User question not well covered: {}",
                truncate_graphemes(question, 200)
            ),
            draft_json: None,
            source_question: question.to_string(),
            reported_confidence: Some(confidence as f64),
            best_kb_score: None,
            best_kb_match: String::new(),
            status: EventStatus::Pending.to_string(),
            reviewer_role: String::new(),
            review_notes: String::new(),
            created_at: now_rfc3339(),
            reviewed_at: None,
        };
        self.ledger.insert_event(&event).await?;
        info!("Reported gap {} from copilot", event.event_id);
        Ok(event)
    }

    /// Store a generated draft on a pending event
    pub async fn attach_draft(&self, event_id: &str, draft: &DraftPayload) -> Result<LearningEvent> {
        let summary = if draft.title.is_empty() {
            self.ledger
                .get_event(event_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Learning event {}", event_id)))?
                .draft_summary
        } else {
            draft.title.clone()
        };
        self.ledger
            .update_event_draft(event_id, &serde_json::to_string(draft)?, &summary)
            .await?;
        self.ledger
            .get_event(event_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Learning event {}", event_id)))
    }
}

fn lineage_source(source_type: &str, source_id: &str, relationship: &str) -> LineageSource {
    LineageSource {
        source_type: source_type.to_string(),
        source_id: source_id.to_string(),
        relationship: relationship.to_string(),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find_map(non_empty)
}

/// Highest numeric suffix among ids matching `{prefix}-{digits}`
fn max_numeric_suffix(prefix: &str, ids: &[String]) -> u32 {
    let pattern = Regex::new(&format!(r"^{}-(\d+)$", regex::escape(prefix)))
        .expect("sequence pattern is valid");
    ids.iter()
        .filter_map(|id| pattern.captures(id))
        .filter_map(|captures| captures[1].parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}
