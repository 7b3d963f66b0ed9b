//! Draft command implementation

use crate::app::AppContext;
use crate::draft::{self, DraftPayload, LineageSource};
use crate::error::{Error, Result};
use crate::ledger::LearningEvent;
use crate::review::{
    REL_CREATED_FROM, REL_REFERENCES, REL_REPORTED_FROM, SOURCE_CONVERSATION, SOURCE_COPILOT,
    SOURCE_SCRIPT, SOURCE_TICKET,
};
use serde::Serialize;
use tracing::info;

/// Inputs for draft generation: at least one of these must identify a source
#[derive(Debug, Clone, Default)]
pub struct DraftRequest {
    pub event_id: Option<String>,
    pub ticket_number: Option<String>,
    pub question: Option<String>,
}

/// A generated draft and the event it was attached to, if any
#[derive(Debug, Clone, Serialize)]
pub struct DraftOutcome {
    pub draft: DraftPayload,
    pub event: Option<LearningEvent>,
}

/// Generate a KB draft from a resolved ticket or a reported gap, and attach
/// it to the learning event when one was named.
pub async fn cmd_draft(ctx: &AppContext, request: DraftRequest) -> Result<DraftOutcome> {
    let event = match request.event_id.as_deref() {
        Some(event_id) => Some(
            ctx.ledger
                .get_event(event_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Learning event {}", event_id)))?,
        ),
        None => None,
    };

    let ticket_number = request
        .ticket_number
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            event
                .as_ref()
                .map(|e| e.ticket_number.clone())
                .filter(|t| !t.trim().is_empty())
        });

    let ticket = ticket_number.as_deref().and_then(|t| ctx.corpus.ticket(t));
    let conversation = ticket_number
        .as_deref()
        .and_then(|t| ctx.corpus.conversation_for_ticket(t));
    let script = ticket
        .filter(|t| !t.script_id.is_empty())
        .and_then(|t| ctx.corpus.script(&t.script_id));

    let generated = match ticket {
        Some(ticket) => {
            info!("Drafting KB article from ticket {}", ticket.ticket_number);
            draft::draft_from_case(ticket, conversation, script, ctx.generator()).await
        }
        None => {
            let question = request
                .question
                .clone()
                .filter(|q| !q.trim().is_empty())
                .or_else(|| {
                    event.as_ref().and_then(|e| {
                        [e.source_question.as_str(), e.detected_gap.as_str()]
                            .into_iter()
                            .find(|s| !s.trim().is_empty())
                            .map(str::to_string)
                    })
                })
                .ok_or_else(|| {
                    Error::Validation("No ticket or question to draft from".to_string())
                })?;
            info!("Drafting KB article from reported question");
            draft::draft_from_gap(&question, ctx.generator()).await
        }
    };

    let mut lineage: Vec<LineageSource> = Vec::new();
    if let Some(ticket_number) = ticket_number.as_deref() {
        lineage.push(LineageSource {
            source_type: SOURCE_TICKET.to_string(),
            source_id: ticket_number.to_string(),
            relationship: REL_CREATED_FROM.to_string(),
        });
    }
    if let Some(conversation) = conversation {
        lineage.push(LineageSource {
            source_type: SOURCE_CONVERSATION.to_string(),
            source_id: conversation.conversation_id.clone(),
            relationship: REL_CREATED_FROM.to_string(),
        });
    }
    if let Some(script) = script {
        lineage.push(LineageSource {
            source_type: SOURCE_SCRIPT.to_string(),
            source_id: script.script_id.clone(),
            relationship: REL_REFERENCES.to_string(),
        });
    }
    if ticket_number.is_none() {
        if let Some(event) = &event {
            lineage.push(LineageSource {
                source_type: SOURCE_COPILOT.to_string(),
                source_id: event.event_id.clone(),
                relationship: REL_REPORTED_FROM.to_string(),
            });
        }
    }

    let payload = DraftPayload {
        title: generated.title,
        body: generated.body,
        tags: generated.tags,
        source_ticket: ticket_number.unwrap_or_default(),
        source_conversation: conversation
            .map(|c| c.conversation_id.clone())
            .or_else(|| event.as_ref().map(|e| e.conversation_id.clone()))
            .unwrap_or_default(),
        source_script: script.map(|s| s.script_id.clone()).unwrap_or_default(),
        lineage,
    };

    let event = match event {
        Some(event) => Some(ctx.workflow.attach_draft(&event.event_id, &payload).await?),
        None => None,
    };

    Ok(DraftOutcome {
        draft: payload,
        event,
    })
}

/// Print a draft to console
pub fn print_draft(outcome: &DraftOutcome) {
    let draft = &outcome.draft;
    println!("\n📝 {}\n", draft.title);
    if !draft.tags.is_empty() {
        println!("Tags: {}\n", draft.tags);
    }
    println!("{}\n", draft.body);

    if !draft.lineage.is_empty() {
        println!("Sources:");
        for source in &draft.lineage {
            println!("  {} {} ({})", source.source_type, source.source_id, source.relationship);
        }
    }

    if let Some(event) = &outcome.event {
        println!("\nDraft attached to event {}", event.event_id);
    }
}
