//! KB draft generation
//!
//! Produces a structured draft (title/body/tags) from a resolved case or a
//! reported low-confidence question. With a generator configured, a
//! structured-JSON prompt is used; malformed output is wrapped rather than
//! rejected. Without one, a deterministic template stands in. Draft
//! generation never errors the request.

use crate::corpus::{ConversationRecord, ScriptRecord, TicketRecord};
use crate::generate::TextGenerator;
use crate::index::truncate_graphemes;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Characters of script text included as generation context
const SCRIPT_EXCERPT_CHARS: usize = 2000;

/// Characters of transcript included as generation context
const TRANSCRIPT_EXCERPT_CHARS: usize = 3000;

pub const KB_GEN_SYSTEM: &str = "\
You are a knowledge-base author for enterprise operations support.
Given a resolved support ticket with its conversation transcript and script details,
generate a knowledge-base article that captures the resolution for future reuse.

You MUST respond with valid JSON only. No markdown, no code fences, just JSON.
{
  \"title\": \"Short descriptive title\",
  \"body\": \"Full article body with problem description, steps to resolve, and verification steps. Use markdown formatting.\",
  \"tags\": \"comma-separated relevant tags\"
}

Rules:
- Be specific and actionable.
- Include the exact steps the agent took.
- Reference the script ID if one was used.
- Replace any real customer names with placeholders.
- Structure: Problem -> Cause -> Resolution Steps -> Verification.";

/// A generated, unreviewed KB article candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: String,
}

/// Source reference carried on a stored draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageSource {
    pub source_type: String,
    pub source_id: String,
    pub relationship: String,
}

/// A draft enriched with its source references, as stored on an event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub source_ticket: String,
    #[serde(default)]
    pub source_conversation: String,
    #[serde(default)]
    pub source_script: String,
    #[serde(default)]
    pub lineage: Vec<LineageSource>,
}

/// Generate a KB draft from a resolved case, optionally enriched with the
/// conversation transcript and the script that was used.
pub async fn draft_from_case(
    ticket: &TicketRecord,
    conversation: Option<&ConversationRecord>,
    script: Option<&ScriptRecord>,
    generator: Option<&dyn TextGenerator>,
) -> KbDraft {
    let generator = match generator {
        Some(generator) => generator,
        None => return template_from_case(ticket),
    };

    let mut context = format!(
        "Ticket: {}\nDescription: {}\nResolution: {}\nRoot Cause: {}\nModule: {} / {}\nProduct: {}\n",
        ticket.subject,
        ticket.description,
        ticket.resolution,
        ticket.root_cause,
        ticket.module,
        ticket.category,
        ticket.product
    );

    if let Some(script) = script {
        context.push_str(&format!(
            "\nScript ID: {}\nScript Purpose: {}\nScript Inputs: {}\nScript Text:\n{}\n",
            script.script_id,
            script.purpose,
            script.inputs,
            truncate_graphemes(&script.text, SCRIPT_EXCERPT_CHARS)
        ));
    }

    if let Some(conversation) = conversation {
        context.push_str(&format!(
            "\nTranscript:\n{}\n",
            truncate_graphemes(&conversation.transcript, TRANSCRIPT_EXCERPT_CHARS)
        ));
    }

    match generator.complete_json(KB_GEN_SYSTEM, &context).await {
        Ok(raw) => parse_structured(&raw, &fallback_title(&ticket.subject), &ticket.tags),
        Err(e) => {
            warn!("Draft generation failed, using template: {}", e);
            template_from_case(ticket)
        }
    }
}

/// Generate a KB draft from a reported low-confidence question
pub async fn draft_from_gap(question: &str, generator: Option<&dyn TextGenerator>) -> KbDraft {
    let generator = match generator {
        Some(generator) => generator,
        None => return template_from_gap(question),
    };

    let context = format!(
        "No ticket exists yet. A support copilot could not answer this question \
         confidently:\n\n{}\n\nWrite a knowledge-base article that would answer it.",
        question
    );

    match generator.complete_json(KB_GEN_SYSTEM, &context).await {
        Ok(raw) => parse_structured(&raw, &fallback_title(question), ""),
        Err(e) => {
            warn!("Draft generation failed, using template: {}", e);
            template_from_gap(question)
        }
    }
}

/// Parse generator output into the three expected fields; malformed output
/// is wrapped into the body with a synthesized title.
fn parse_structured(raw: &str, fallback_title: &str, fallback_tags: &str) -> KbDraft {
    match serde_json::from_str::<KbDraft>(raw.trim()) {
        Ok(draft) if !draft.title.is_empty() || !draft.body.is_empty() => draft,
        _ => KbDraft {
            title: fallback_title.to_string(),
            body: raw.to_string(),
            tags: fallback_tags.to_string(),
        },
    }
}

fn fallback_title(subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        "Resolution: Unknown Issue".to_string()
    } else {
        format!("Resolution: {}", truncate_graphemes(subject, 120))
    }
}

/// Deterministic template used when no generator is available
fn template_from_case(ticket: &TicketRecord) -> KbDraft {
    KbDraft {
        title: fallback_title(&ticket.subject),
        body: format!(
            "## Problem\n{}\n\n## Resolution\n{}",
            ticket.description, ticket.resolution
        ),
        tags: ticket.tags.clone(),
    }
}

fn template_from_gap(question: &str) -> KbDraft {
    KbDraft {
        title: fallback_title(question),
        body: format!(
            "## Problem\n{}\n\n## Resolution\nPending documentation from the reviewing engineer.",
            question
        ),
        tags: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result as CrateResult};
    use async_trait::async_trait;

    struct CannedGenerator {
        output: CrateResult<String>,
    }

    impl CannedGenerator {
        fn ok(output: &str) -> Self {
            Self {
                output: Ok(output.to_string()),
            }
        }

        fn failing() -> Self {
            Self {
                output: Err(Error::Generation("backend down".to_string())),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn complete(&self, _system: &str, _user: &str) -> CrateResult<String> {
            match &self.output {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(Error::Generation(e.to_string())),
            }
        }

        async fn complete_json(&self, system: &str, user: &str) -> CrateResult<String> {
            self.complete(system, user).await
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn ticket() -> TicketRecord {
        TicketRecord {
            ticket_number: "T-100".to_string(),
            subject: "Cache corruption on sync".to_string(),
            description: "Tenant ledger shows stale balances".to_string(),
            resolution: "Reset the cache".to_string(),
            tags: "cache,sync".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_template_without_generator() {
        let draft = draft_from_case(&ticket(), None, None, None).await;
        assert_eq!(draft.title, "Resolution: Cache corruption on sync");
        assert_eq!(
            draft.body,
            "## Problem\nTenant ledger shows stale balances\n\n## Resolution\nReset the cache"
        );
        assert_eq!(draft.tags, "cache,sync");
    }

    #[tokio::test]
    async fn test_structured_output_is_parsed() {
        let generator = CannedGenerator::ok(
            r#"{"title": "Fix stale balances", "body": "Run the reset.", "tags": "cache"}"#,
        );
        let draft = draft_from_case(&ticket(), None, None, Some(&generator)).await;
        assert_eq!(draft.title, "Fix stale balances");
        assert_eq!(draft.body, "Run the reset.");
    }

    #[tokio::test]
    async fn test_malformed_output_is_wrapped_not_rejected() {
        let generator = CannedGenerator::ok("Sorry, here is prose instead of JSON.");
        let draft = draft_from_case(&ticket(), None, None, Some(&generator)).await;
        assert_eq!(draft.title, "Resolution: Cache corruption on sync");
        assert_eq!(draft.body, "Sorry, here is prose instead of JSON.");
        assert_eq!(draft.tags, "cache,sync");
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back_to_template() {
        let generator = CannedGenerator::failing();
        let draft = draft_from_case(&ticket(), None, None, Some(&generator)).await;
        assert!(draft.body.starts_with("## Problem"));
    }

    #[tokio::test]
    async fn test_draft_from_gap_template() {
        let draft = draft_from_gap("How do I rotate API keys?", None).await;
        assert_eq!(draft.title, "Resolution: How do I rotate API keys?");
        assert!(draft.body.contains("## Problem\nHow do I rotate API keys?"));
    }
}
