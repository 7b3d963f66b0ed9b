//! Ask command implementation

use crate::app::AppContext;
use crate::copilot::{self, AskOptions, CopilotAnswer};
use crate::error::Result;
use crate::ledger::LearningEvent;
use serde::Serialize;
use tracing::info;

/// Options for the ask command
#[derive(Debug, Clone, Default)]
pub struct AskCommandOptions {
    pub include_kb: bool,
    pub include_scripts: bool,
    pub include_tickets: bool,
    pub top_k: Option<usize>,
    /// When set, answers below this confidence are reported as gaps
    pub report_below: Option<f32>,
}

/// Answer plus any gap event the low-confidence loop created
#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: CopilotAnswer,
    pub reported_event: Option<LearningEvent>,
}

/// Answer a support question, optionally reporting a gap on low confidence
pub async fn cmd_ask(ctx: &AppContext, question: &str, options: AskCommandOptions) -> Result<AskOutcome> {
    info!("Answering: {}", question);

    let ask_options = AskOptions {
        include_kb: options.include_kb,
        include_scripts: options.include_scripts,
        include_tickets: options.include_tickets,
        top_k: options.top_k.unwrap_or(ctx.config.retrieval.top_k),
    };
    let answer = copilot::answer(ctx.index.as_ref(), ctx.generator(), question, &ask_options).await?;

    let reported_event = match options.report_below {
        Some(threshold) if answer.confidence < threshold => {
            Some(ctx.workflow.report_gap(question, answer.confidence, None).await?)
        }
        _ => None,
    };

    Ok(AskOutcome {
        answer,
        reported_event,
    })
}

/// Print an answer to the console
pub fn print_answer(outcome: &AskOutcome) {
    let answer = &outcome.answer;
    println!("\n{}\n", answer.answer);
    println!(
        "Confidence: {:.1}% | Type: {}",
        answer.confidence * 100.0,
        answer.answer_type
    );

    if !answer.sources.is_empty() {
        println!("\nSources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "{}. [score: {:.3}] ({}) {} — {}",
                i + 1,
                source.score,
                source.doc_type,
                source.id,
                source.title
            );
        }
    }

    if let Some(event) = &outcome.reported_event {
        println!(
            "\n⚠️  Low confidence — reported knowledge gap {} for review",
            event.event_id
        );
    }
}
