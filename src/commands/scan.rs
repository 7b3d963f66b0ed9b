//! Gap scan command implementation

use crate::app::AppContext;
use crate::error::Result;
use crate::gaps::{self, is_eligible};
use crate::ledger::LearningEvent;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

/// Outcome of a gap scan run
#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub threshold: f32,
    pub cases_scanned: usize,
    pub gaps_found: usize,
    pub new_events: Vec<LearningEvent>,
    pub total_events: usize,
}

/// Scan every eligible resolved case for missing KB coverage and record new
/// gaps as pending learning events.
pub async fn cmd_scan_gaps(ctx: &AppContext, threshold: Option<f32>) -> Result<ScanStats> {
    let threshold = threshold.unwrap_or(ctx.config.retrieval.similarity_threshold);
    let eligible = ctx.corpus.tickets.iter().filter(|t| is_eligible(t)).count();
    info!("Scanning {} eligible cases (threshold {:.2})", eligible, threshold);

    let bar = ProgressBar::new(eligible as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} cases")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let found = gaps::detect_gaps(
        &ctx.corpus.tickets,
        ctx.index.as_ref(),
        threshold,
        ctx.config.retrieval.gap_query_max_chars,
        |_| bar.inc(1),
    )
    .await?;
    bar.finish_and_clear();

    let outcome = ctx.workflow.record_gaps(&found, threshold).await?;

    Ok(ScanStats {
        threshold,
        cases_scanned: eligible,
        gaps_found: found.len(),
        new_events: outcome.new_events,
        total_events: outcome.total_events,
    })
}

/// Print scan results to console
pub fn print_scan_stats(stats: &ScanStats) {
    println!("\n🔍 Gap scan complete (threshold {:.0}%)\n", stats.threshold * 100.0);
    println!("  Cases scanned:  {}", stats.cases_scanned);
    println!("  Gaps found:     {}", stats.gaps_found);
    println!("  New events:     {}", stats.new_events.len());
    println!("  Total events:   {}", stats.total_events);

    if !stats.new_events.is_empty() {
        println!("\nNew learning events:");
        for event in &stats.new_events {
            println!(
                "  {} — {} (best KB score {:.4})",
                event.event_id,
                event.ticket_number,
                event.best_kb_score.unwrap_or(0.0)
            );
        }
    }
}
