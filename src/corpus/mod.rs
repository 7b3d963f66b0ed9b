//! Corpus loading and typed sheet records
//!
//! The corpus is a pre-exported JSON dump of the support workbook: a mapping
//! from sheet name to an ordered sequence of records. Parsing the native
//! workbook format is out of scope here; this module validates natural keys
//! once at load time and builds the lookups the rest of the system keys on.

use crate::error::{Error, Result};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// A resolved support ticket (case)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketRecord {
    #[serde(rename = "Ticket_Number", default)]
    pub ticket_number: String,
    #[serde(rename = "Subject", default)]
    pub subject: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Resolution", default)]
    pub resolution: String,
    #[serde(rename = "Root_Cause", default)]
    pub root_cause: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Priority", default)]
    pub priority: String,
    #[serde(rename = "Tier", default, deserialize_with = "de_flexible_number")]
    pub tier: Option<f64>,
    #[serde(rename = "Product", default)]
    pub product: String,
    #[serde(rename = "Module", default)]
    pub module: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    #[serde(rename = "Tags", default)]
    pub tags: String,
    #[serde(rename = "Script_ID", default)]
    pub script_id: String,
    #[serde(rename = "KB_Article_ID", default)]
    pub kb_article_id: String,
    #[serde(rename = "Created_At", default)]
    pub created_at: String,
}

impl TicketRecord {
    /// Retrievable text for the ticket partition
    pub fn index_text(&self) -> String {
        format!(
            "Subject: {}\nDescription: {}\nResolution: {}\nRoot Cause: {}",
            self.subject, self.description, self.resolution, self.root_cause
        )
    }

    /// Query text used by gap detection (subject + description + resolution)
    pub fn gap_query_text(&self) -> String {
        format!("{} {} {}", self.subject, self.description, self.resolution)
    }
}

/// A support conversation transcript, keyed by ticket number
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(rename = "Conversation_ID", default)]
    pub conversation_id: String,
    #[serde(rename = "Ticket_Number", default)]
    pub ticket_number: String,
    #[serde(rename = "Channel", default)]
    pub channel: String,
    #[serde(rename = "Agent_Name", default)]
    pub agent_name: String,
    #[serde(rename = "Issue_Summary", default)]
    pub issue_summary: String,
    #[serde(rename = "Sentiment", default)]
    pub sentiment: String,
    #[serde(rename = "Transcript", default)]
    pub transcript: String,
}

/// A Tier-3 remediation script
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptRecord {
    #[serde(rename = "Script_ID", default)]
    pub script_id: String,
    #[serde(rename = "Script_Title", default)]
    pub title: String,
    #[serde(rename = "Script_Purpose", default)]
    pub purpose: String,
    #[serde(rename = "Script_Inputs", default)]
    pub inputs: String,
    #[serde(rename = "Module", default)]
    pub module: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    #[serde(rename = "Script_Text_Sanitized", default)]
    pub text: String,
}

impl ScriptRecord {
    /// Retrievable text for the script partition
    pub fn index_text(&self) -> String {
        format!(
            "{}\nPurpose: {}\nInputs: {}\nModule: {} / {}",
            self.title, self.purpose, self.inputs, self.module, self.category
        )
    }
}

/// A knowledge-base article as shipped in the corpus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbArticleSheetRecord {
    #[serde(rename = "KB_Article_ID", default)]
    pub kb_article_id: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "Tags", default)]
    pub tags: String,
    #[serde(rename = "Module", default)]
    pub module: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    #[serde(rename = "Source_Type", default)]
    pub source_type: String,
    #[serde(rename = "Created_At", default)]
    pub created_at: String,
}

/// A provenance row from the KB_Lineage sheet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageSheetRecord {
    #[serde(rename = "KB_Article_ID", default)]
    pub kb_article_id: String,
    #[serde(rename = "Source_ID", default)]
    pub source_id: String,
    #[serde(rename = "Source_Type", default)]
    pub source_type: String,
    #[serde(rename = "Relationship", default)]
    pub relationship: String,
}

/// A learning event row from the Learning_Events sheet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningEventSheetRecord {
    #[serde(rename = "Event_ID", default)]
    pub event_id: String,
    #[serde(rename = "Trigger_Ticket_Number", default)]
    pub ticket_number: String,
    #[serde(rename = "Trigger_Conversation_ID", default)]
    pub conversation_id: String,
    #[serde(rename = "Detected_Gap", default)]
    pub detected_gap: String,
    #[serde(rename = "Proposed_KB_Article_ID", default)]
    pub proposed_kb_id: String,
    #[serde(rename = "Draft_Summary", default)]
    pub draft_summary: String,
    #[serde(rename = "Final_Status", default)]
    pub status: String,
    #[serde(rename = "Reviewer_Role", default)]
    pub reviewer_role: String,
    #[serde(rename = "Event_Timestamp", default, deserialize_with = "de_flexible_string")]
    pub timestamp: String,
}

/// The loaded corpus: typed sheets plus natural-key lookups
#[derive(Debug, Default)]
pub struct Corpus {
    pub tickets: Vec<TicketRecord>,
    pub conversations: Vec<ConversationRecord>,
    pub scripts: Vec<ScriptRecord>,
    pub kb_articles: Vec<KbArticleSheetRecord>,
    pub lineage: Vec<LineageSheetRecord>,
    pub learning_events: Vec<LearningEventSheetRecord>,

    ticket_index: HashMap<String, usize>,
    conversation_index: HashMap<String, usize>,
    script_index: HashMap<String, usize>,
    kb_index: HashMap<String, usize>,
}

impl Corpus {
    /// Load the corpus from a JSON workbook export
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Corpus(format!("Data file not found: {}", path.display())));
        }

        info!("Loading corpus from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let raw: HashMap<String, Vec<Value>> = serde_json::from_str(&content)?;
        Self::from_sheets(raw)
    }

    /// Build a corpus from raw sheet data (mapping from sheet name to rows)
    pub fn from_sheets(raw: HashMap<String, Vec<Value>>) -> Result<Self> {
        let mut corpus = Corpus {
            tickets: parse_sheet(&raw, "Tickets", |t: &TicketRecord| !t.ticket_number.is_empty()),
            conversations: parse_sheet(&raw, "Conversations", |c: &ConversationRecord| {
                !c.ticket_number.is_empty()
            }),
            scripts: parse_sheet(&raw, "Scripts_Master", |s: &ScriptRecord| !s.script_id.is_empty()),
            kb_articles: parse_sheet(&raw, "Knowledge_Articles", |a: &KbArticleSheetRecord| {
                !a.kb_article_id.is_empty()
            }),
            lineage: parse_sheet(&raw, "KB_Lineage", |l: &LineageSheetRecord| {
                !l.kb_article_id.is_empty() && !l.source_id.is_empty()
            }),
            learning_events: parse_sheet(&raw, "Learning_Events", |e: &LearningEventSheetRecord| {
                !e.event_id.is_empty()
            }),
            ..Default::default()
        };

        corpus.ticket_index = corpus
            .tickets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.ticket_number.clone(), i))
            .collect();
        // conversations are looked up by the ticket they belong to
        corpus.conversation_index = corpus
            .conversations
            .iter()
            .enumerate()
            .map(|(i, c)| (c.ticket_number.clone(), i))
            .collect();
        corpus.script_index = corpus
            .scripts
            .iter()
            .enumerate()
            .map(|(i, s)| (s.script_id.clone(), i))
            .collect();
        corpus.kb_index = corpus
            .kb_articles
            .iter()
            .enumerate()
            .map(|(i, a)| (a.kb_article_id.clone(), i))
            .collect();

        info!(
            "Corpus loaded: {} tickets, {} conversations, {} scripts, {} KB articles, {} lineage rows, {} learning events",
            corpus.tickets.len(),
            corpus.conversations.len(),
            corpus.scripts.len(),
            corpus.kb_articles.len(),
            corpus.lineage.len(),
            corpus.learning_events.len()
        );
        Ok(corpus)
    }

    /// Look up a ticket by its number
    pub fn ticket(&self, ticket_number: &str) -> Option<&TicketRecord> {
        self.ticket_index.get(ticket_number).map(|&i| &self.tickets[i])
    }

    /// Look up the conversation attached to a ticket
    pub fn conversation_for_ticket(&self, ticket_number: &str) -> Option<&ConversationRecord> {
        self.conversation_index
            .get(ticket_number)
            .map(|&i| &self.conversations[i])
    }

    /// Look up a script by its ID
    pub fn script(&self, script_id: &str) -> Option<&ScriptRecord> {
        self.script_index.get(script_id).map(|&i| &self.scripts[i])
    }

    /// Look up a corpus KB article by its ID
    pub fn kb_article(&self, article_id: &str) -> Option<&KbArticleSheetRecord> {
        self.kb_index.get(article_id).map(|&i| &self.kb_articles[i])
    }

    /// Average resolution tier over tickets carrying a tier value
    pub fn avg_resolution_tier(&self) -> f64 {
        let tiers: Vec<f64> = self.tickets.iter().filter_map(|t| t.tier).collect();
        if tiers.is_empty() {
            0.0
        } else {
            tiers.iter().sum::<f64>() / tiers.len() as f64
        }
    }
}

/// Parse one sheet's rows into typed records, skipping rows that fail
/// deserialization or lack their natural key. Validation happens here, once,
/// so downstream code never re-checks required fields.
fn parse_sheet<T>(raw: &HashMap<String, Vec<Value>>, sheet: &str, keep: impl Fn(&T) -> bool) -> Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    let rows = match raw.get(sheet) {
        Some(rows) => rows,
        None => {
            warn!("Sheet '{}' not found in corpus export", sheet);
            return Vec::new();
        }
    };

    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for row in rows {
        match serde_json::from_value::<T>(row.clone()) {
            Ok(record) if keep(&record) => records.push(record),
            Ok(_) => skipped += 1,
            Err(e) => {
                skipped += 1;
                warn!("Skipping malformed row in sheet '{}': {}", sheet, e);
            }
        }
    }
    if skipped > 0 {
        warn!("Sheet '{}': skipped {} rows without required keys", sheet, skipped);
    }
    records
}

/// Accept numbers encoded as JSON numbers or strings; anything else is None
fn de_flexible_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }))
}

/// Accept strings or any scalar rendered as its display form
fn de_flexible_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_sheets() -> HashMap<String, Vec<Value>> {
        let mut raw = HashMap::new();
        raw.insert(
            "Tickets".to_string(),
            vec![
                json!({
                    "Ticket_Number": "T-100",
                    "Subject": "Cache corruption on sync",
                    "Description": "Tenant ledger shows stale balances",
                    "Resolution": "Reset the cache",
                    "Status": "Closed",
                    "Tier": "3",
                    "Script_ID": "SCR-001"
                }),
                json!({"Subject": "missing natural key"}),
            ],
        );
        raw.insert(
            "Conversations".to_string(),
            vec![json!({
                "Conversation_ID": "CONV-9",
                "Ticket_Number": "T-100",
                "Channel": "chat"
            })],
        );
        raw.insert(
            "Scripts_Master".to_string(),
            vec![json!({
                "Script_ID": "SCR-001",
                "Script_Title": "Flush tenant cache",
                "Script_Purpose": "Clears the balance cache"
            })],
        );
        raw.insert(
            "Knowledge_Articles".to_string(),
            vec![json!({
                "KB_Article_ID": "KB-0001",
                "Title": "Balance display issues",
                "Body": "Check the sync job"
            })],
        );
        raw
    }

    #[test]
    fn test_load_skips_rows_without_natural_key() {
        let corpus = Corpus::from_sheets(sample_sheets()).unwrap();
        assert_eq!(corpus.tickets.len(), 1);
        assert_eq!(corpus.tickets[0].ticket_number, "T-100");
    }

    #[test]
    fn test_tier_parses_from_string() {
        let corpus = Corpus::from_sheets(sample_sheets()).unwrap();
        assert_eq!(corpus.tickets[0].tier, Some(3.0));
    }

    #[test]
    fn test_lookups() {
        let corpus = Corpus::from_sheets(sample_sheets()).unwrap();
        assert!(corpus.ticket("T-100").is_some());
        assert_eq!(
            corpus.conversation_for_ticket("T-100").unwrap().conversation_id,
            "CONV-9"
        );
        assert!(corpus.script("SCR-001").is_some());
        assert!(corpus.kb_article("KB-0001").is_some());
        assert!(corpus.ticket("T-999").is_none());
    }

    #[test]
    fn test_index_text_shapes() {
        let corpus = Corpus::from_sheets(sample_sheets()).unwrap();
        let ticket_text = corpus.tickets[0].index_text();
        assert!(ticket_text.starts_with("Subject: Cache corruption"));
        assert!(ticket_text.contains("Resolution: Reset the cache"));

        let script_text = corpus.scripts[0].index_text();
        assert!(script_text.starts_with("Flush tenant cache"));
        assert!(script_text.contains("Purpose: Clears the balance cache"));
    }

    #[test]
    fn test_missing_sheet_is_empty() {
        let corpus = Corpus::from_sheets(HashMap::new()).unwrap();
        assert!(corpus.tickets.is_empty());
        assert!(corpus.learning_events.is_empty());
    }
}
