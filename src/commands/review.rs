//! Review command implementation

use crate::app::AppContext;
use crate::error::Result;
use crate::ledger::LearningEvent;
use crate::review::ApprovalOutcome;
use clap::ValueEnum;
use serde::Serialize;

/// Reviewer verdict on a learning event
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReviewVerdict {
    Approve,
    Reject,
}

/// Outcome of a review transition
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReviewOutcome {
    Approved(ApprovalOutcome),
    Rejected(LearningEvent),
}

/// Apply a reviewer verdict to a learning event
pub async fn cmd_review(
    ctx: &AppContext,
    event_id: &str,
    verdict: ReviewVerdict,
    edited_title: Option<&str>,
    edited_body: Option<&str>,
    notes: &str,
) -> Result<ReviewOutcome> {
    match verdict {
        ReviewVerdict::Approve => {
            let outcome = ctx
                .workflow
                .approve(event_id, edited_title, edited_body, notes)
                .await?;
            Ok(ReviewOutcome::Approved(outcome))
        }
        ReviewVerdict::Reject => {
            let event = ctx.workflow.reject(event_id, notes).await?;
            Ok(ReviewOutcome::Rejected(event))
        }
    }
}

/// Print a review outcome to console
pub fn print_review(outcome: &ReviewOutcome) {
    match outcome {
        ReviewOutcome::Approved(approval) => {
            println!(
                "\n✅ Event {} approved — published as {}",
                approval.event.event_id, approval.article_id
            );
            println!("   Title: {}", approval.event.draft_summary);
            println!("   KB articles total: {}", approval.kb_total_after);
        }
        ReviewOutcome::Rejected(event) => {
            println!("\n🚫 Event {} rejected", event.event_id);
            if !event.review_notes.is_empty() {
                println!("   Notes: {}", event.review_notes);
            }
        }
    }
}
