//! Knowledge gap detection
//!
//! Scans resolved cases against the KB partition to find under-covered
//! topics. The scan deliberately visits every eligible case with no early
//! termination so operators always get a complete gap list; it only reads
//! the index and is meant for an operator-triggered cadence.

use crate::corpus::TicketRecord;
use crate::error::Result;
use crate::index::{truncate_graphemes, DocType, SemanticIndex};
use serde::Serialize;
use tracing::debug;

/// Tier at or above which a case counts as fully escalated
pub const MAX_ESCALATION_TIER: f64 = 3.0;

/// A resolved case with no adequate KB coverage
#[derive(Debug, Clone, Serialize)]
pub struct GapCandidate {
    pub ticket_number: String,
    pub subject: String,
    pub resolution: String,
    pub best_kb_score: f32,
    pub best_kb_match: Option<String>,
}

/// Whether a case qualifies for gap scanning: terminal resolved/closed
/// status, non-empty resolution, and (when a tier is recorded) at the
/// highest escalation tier. This targets the hardest, least-covered cases.
pub fn is_eligible(ticket: &TicketRecord) -> bool {
    let status = ticket.status.trim();
    let terminal = status.eq_ignore_ascii_case("closed") || status.eq_ignore_ascii_case("resolved");
    if !terminal || ticket.resolution.trim().is_empty() {
        return false;
    }
    match ticket.tier {
        // Tier zero appears in exports that use 0 for "not recorded"
        Some(tier) if tier > 0.0 => tier >= MAX_ESCALATION_TIER,
        _ => true,
    }
}

/// Scan all cases and return those whose best KB match scores strictly
/// below `threshold`. Absence of any KB result counts as a score of 0.0.
/// `on_case` is invoked once per eligible case for progress reporting.
pub async fn detect_gaps(
    tickets: &[TicketRecord],
    index: &dyn SemanticIndex,
    threshold: f32,
    query_max_chars: usize,
    mut on_case: impl FnMut(&TicketRecord),
) -> Result<Vec<GapCandidate>> {
    let mut gaps = Vec::new();

    for ticket in tickets {
        if !is_eligible(ticket) {
            continue;
        }
        on_case(ticket);

        let query = ticket.gap_query_text();
        let query = truncate_graphemes(&query, query_max_chars);
        let results = index.query(DocType::KbArticle, query, 1).await?;

        let best_score = results.first().map(|r| r.score).unwrap_or(0.0);
        let best_match = results.first().map(|r| r.id.clone());

        debug!(
            "Ticket {} best KB score {:.4} (threshold {:.4})",
            ticket.ticket_number, best_score, threshold
        );

        // Strictly below: a score exactly at the threshold is NOT a gap
        if best_score < threshold {
            gaps.push(GapCandidate {
                ticket_number: ticket.ticket_number.clone(),
                subject: ticket.subject.clone(),
                resolution: ticket.resolution.clone(),
                best_kb_score: best_score,
                best_kb_match: best_match,
            });
        }
    }

    Ok(gaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CrateResult;
    use crate::index::{IndexDocument, SearchResult, SemanticIndex};
    use async_trait::async_trait;
    use serde_json::Map;

    /// Index stub returning one fixed-score KB hit
    struct FixedScoreIndex {
        score: Option<f32>,
    }

    #[async_trait]
    impl SemanticIndex for FixedScoreIndex {
        async fn ensure_ready(&self) -> CrateResult<()> {
            Ok(())
        }

        async fn count(&self, _partition: DocType) -> CrateResult<usize> {
            Ok(usize::from(self.score.is_some()))
        }

        async fn upsert(&self, _partition: DocType, _doc: IndexDocument) -> CrateResult<()> {
            Ok(())
        }

        async fn bulk_index(&self, _partition: DocType, docs: Vec<IndexDocument>) -> CrateResult<usize> {
            Ok(docs.len())
        }

        async fn query(&self, partition: DocType, _text: &str, _k: usize) -> CrateResult<Vec<SearchResult>> {
            Ok(self
                .score
                .map(|score| {
                    vec![SearchResult {
                        id: "KB-0001".to_string(),
                        doc_type: partition,
                        title: "Existing article".to_string(),
                        snippet: String::new(),
                        score,
                        metadata: Map::new(),
                    }]
                })
                .unwrap_or_default())
        }
    }

    fn closed_tier3_ticket(number: &str) -> TicketRecord {
        TicketRecord {
            ticket_number: number.to_string(),
            subject: "Cache corruption on sync".to_string(),
            description: "stale balances".to_string(),
            resolution: "Reset the cache".to_string(),
            status: "Closed".to_string(),
            tier: Some(3.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_eligibility_filter() {
        let mut ticket = closed_tier3_ticket("T-1");
        assert!(is_eligible(&ticket));

        ticket.status = "Open".to_string();
        assert!(!is_eligible(&ticket));

        ticket.status = "Resolved".to_string();
        assert!(is_eligible(&ticket));

        ticket.resolution = String::new();
        assert!(!is_eligible(&ticket));

        let mut low_tier = closed_tier3_ticket("T-2");
        low_tier.tier = Some(2.0);
        assert!(!is_eligible(&low_tier));

        let mut no_tier = closed_tier3_ticket("T-3");
        no_tier.tier = None;
        assert!(is_eligible(&no_tier));

        let mut zero_tier = closed_tier3_ticket("T-4");
        zero_tier.tier = Some(0.0);
        assert!(is_eligible(&zero_tier));
    }

    #[tokio::test]
    async fn test_score_at_threshold_is_not_a_gap() {
        let tickets = vec![closed_tier3_ticket("T-1")];
        let index = FixedScoreIndex { score: Some(0.35) };
        let gaps = detect_gaps(&tickets, &index, 0.35, 1000, |_| {}).await.unwrap();
        assert!(gaps.is_empty());
    }

    #[tokio::test]
    async fn test_score_just_below_threshold_is_a_gap() {
        let tickets = vec![closed_tier3_ticket("T-1")];
        let index = FixedScoreIndex { score: Some(0.3499) };
        let gaps = detect_gaps(&tickets, &index, 0.35, 1000, |_| {}).await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].ticket_number, "T-1");
        assert_eq!(gaps[0].best_kb_match.as_deref(), Some("KB-0001"));
    }

    #[tokio::test]
    async fn test_no_kb_results_counts_as_zero() {
        let tickets = vec![closed_tier3_ticket("T-1")];
        let index = FixedScoreIndex { score: None };
        let gaps = detect_gaps(&tickets, &index, 0.35, 1000, |_| {}).await.unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].best_kb_score, 0.0);
        assert!(gaps[0].best_kb_match.is_none());
    }

    #[tokio::test]
    async fn test_scan_visits_every_eligible_case() {
        let tickets = vec![
            closed_tier3_ticket("T-1"),
            {
                let mut t = closed_tier3_ticket("T-2");
                t.status = "Open".to_string();
                t
            },
            closed_tier3_ticket("T-3"),
        ];
        let index = FixedScoreIndex { score: Some(0.9) };
        let mut visited = Vec::new();
        detect_gaps(&tickets, &index, 0.35, 1000, |t| visited.push(t.ticket_number.clone()))
            .await
            .unwrap();
        assert_eq!(visited, vec!["T-1".to_string(), "T-3".to_string()]);
    }
}
