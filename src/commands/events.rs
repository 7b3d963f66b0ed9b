//! Events listing command implementation

use crate::app::AppContext;
use crate::error::Result;
use crate::ledger::{EventStatus, LearningEvent, StatusCounts};
use serde::Serialize;

/// Learning events with status breakdown
#[derive(Debug, Clone, Serialize)]
pub struct EventsList {
    pub events: Vec<LearningEvent>,
    pub counts: StatusCounts,
}

/// List learning events, optionally filtered by status
pub async fn cmd_list_events(ctx: &AppContext, status: Option<&str>) -> Result<EventsList> {
    let status = status.map(str::parse::<EventStatus>).transpose()?;
    Ok(EventsList {
        events: ctx.ledger.list_events(status).await?,
        counts: ctx.ledger.status_counts().await?,
    })
}

/// Print events to console
pub fn print_events(list: &EventsList) {
    println!(
        "\n📋 Learning events — {} pending, {} approved, {} rejected\n",
        list.counts.pending, list.counts.approved, list.counts.rejected
    );

    if list.events.is_empty() {
        println!("No events match.");
        return;
    }

    for event in &list.events {
        let subject = if event.ticket_number.is_empty() {
            event.detected_gap.as_str()
        } else {
            event.ticket_number.as_str()
        };
        println!("{:<20} {:<10} {}", event.event_id, event.status, subject);
        if !event.proposed_kb_id.is_empty() {
            println!("{:<20} {:<10} proposed: {}", "", "", event.proposed_kb_id);
        }
    }
}
