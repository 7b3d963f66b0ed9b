//! Status command implementation

use crate::app::AppContext;
use crate::error::Result;
use crate::index::{DocType, SemanticIndex};
use crate::ledger::StatusCounts;
use serde::Serialize;

/// Per-partition index counts
#[derive(Debug, Clone, Serialize)]
pub struct IndexCounts {
    pub kb_articles: usize,
    pub scripts: usize,
    pub tickets: usize,
}

/// Aggregate system status
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub tickets: usize,
    pub conversations: usize,
    pub scripts: usize,
    pub kb_articles: usize,
    pub lineage_edges: usize,
    pub events: StatusCounts,
    pub avg_resolution_tier: f64,
    pub indexed: IndexCounts,
}

/// Collect corpus, ledger, and index statistics
pub async fn cmd_status(ctx: &AppContext) -> Result<StatusReport> {
    Ok(StatusReport {
        tickets: ctx.corpus.tickets.len(),
        conversations: ctx.corpus.conversations.len(),
        scripts: ctx.corpus.scripts.len(),
        kb_articles: ctx.ledger.count_articles().await?,
        lineage_edges: ctx.ledger.count_lineage().await?,
        events: ctx.ledger.status_counts().await?,
        avg_resolution_tier: (ctx.corpus.avg_resolution_tier() * 100.0).round() / 100.0,
        indexed: IndexCounts {
            kb_articles: ctx.index.count(DocType::KbArticle).await?,
            scripts: ctx.index.count(DocType::Script).await?,
            tickets: ctx.index.count(DocType::Ticket).await?,
        },
    })
}

/// Print status to console
pub fn print_status(report: &StatusReport) {
    println!("\n📊 supportmind status\n");
    println!("Corpus:");
    println!("  Tickets:        {}", report.tickets);
    println!("  Conversations:  {}", report.conversations);
    println!("  Scripts:        {}", report.scripts);
    println!("  Avg tier:       {:.2}", report.avg_resolution_tier);
    println!("\nKnowledge ledger:");
    println!("  KB articles:    {}", report.kb_articles);
    println!("  Lineage edges:  {}", report.lineage_edges);
    println!(
        "  Events:         {} pending / {} approved / {} rejected",
        report.events.pending, report.events.approved, report.events.rejected
    );
    println!("\nIndex:");
    println!("  kb_articles:    {}", report.indexed.kb_articles);
    println!("  scripts:        {}", report.indexed.scripts);
    println!("  tickets:        {}", report.indexed.tickets);
}
