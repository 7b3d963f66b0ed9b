//! Copilot answer synthesis
//!
//! Turns a question plus fused retrieval results into a grounded answer.
//! When no generator is available (or a generation call fails), an
//! extractive fallback composed from the top result is returned instead;
//! the caller always gets a well-formed answer.

use crate::error::Result;
use crate::generate::TextGenerator;
use crate::index::{round_score, truncate_graphemes, DocType, SearchResult, SemanticIndex};
use crate::retrieval;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Maximum sources attached to an answer
const MAX_SOURCES: usize = 5;

/// Maximum characters of the top snippet quoted by the extractive fallback
const FALLBACK_EXCERPT_CHARS: usize = 1000;

pub const COPILOT_SYSTEM: &str = "\
You are an expert support copilot for enterprise operations software.
Given the user's question and relevant source documents, provide a clear, accurate answer.

Rules:
- Ground your answer ONLY in the provided sources. Do not hallucinate.
- If the answer requires a backend script, cite the script ID and explain what inputs are needed.
- If the answer comes from a KB article, cite the article ID.
- If unsure, say so and suggest escalation.
- Be concise and actionable.
- Format your response in clear paragraphs. Use markdown for structure.";

/// Provenance classification of an answer, derived from the top result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerKind {
    #[serde(rename = "KB")]
    Kb,
    #[serde(rename = "SCRIPT")]
    Script,
    #[serde(rename = "TICKET_RESOLUTION")]
    TicketResolution,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl From<DocType> for AnswerKind {
    fn from(doc_type: DocType) -> Self {
        match doc_type {
            DocType::KbArticle => AnswerKind::Kb,
            DocType::Script => AnswerKind::Script,
            DocType::Ticket => AnswerKind::TicketResolution,
        }
    }
}

impl fmt::Display for AnswerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerKind::Kb => write!(f, "KB"),
            AnswerKind::Script => write!(f, "SCRIPT"),
            AnswerKind::TicketResolution => write!(f, "TICKET_RESOLUTION"),
            AnswerKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A synthesized answer with provenance
#[derive(Debug, Clone, Serialize)]
pub struct CopilotAnswer {
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<SearchResult>,
    pub answer_type: AnswerKind,
}

/// Partition include flags and limits for a question
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub include_kb: bool,
    pub include_scripts: bool,
    pub include_tickets: bool,
    pub top_k: usize,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            include_kb: true,
            include_scripts: true,
            include_tickets: true,
            top_k: 5,
        }
    }
}

/// Answer a support question over the index
pub async fn answer(
    index: &dyn SemanticIndex,
    generator: Option<&dyn TextGenerator>,
    question: &str,
    options: &AskOptions,
) -> Result<CopilotAnswer> {
    let partitions = retrieval::partitions_for(
        options.include_kb,
        options.include_scripts,
        options.include_tickets,
    );
    let results = retrieval::search(index, question, &partitions, options.top_k).await?;

    if results.is_empty() {
        return Ok(CopilotAnswer {
            answer: "I couldn't find relevant information for your question. \
                     Please escalate to a Tier 3 engineer."
                .to_string(),
            confidence: 0.0,
            sources: Vec::new(),
            answer_type: AnswerKind::Unknown,
        });
    }

    let answer_type = AnswerKind::from(results[0].doc_type);
    let confidence = round_score(results[0].score);

    let answer_text = match generator {
        Some(generator) => {
            let prompt = format!(
                "Question: {}\n\nRelevant Sources:\n{}",
                question,
                build_context(&results)
            );
            match generator.complete(COPILOT_SYSTEM, &prompt).await {
                Ok(text) => text,
                Err(e) => {
                    // Generation failures never surface on the answer path
                    warn!("Generation failed, using extractive fallback: {}", e);
                    build_fallback_answer(&results)
                }
            }
        }
        None => build_fallback_answer(&results),
    };

    let mut sources = results;
    sources.truncate(MAX_SOURCES);

    Ok(CopilotAnswer {
        answer: answer_text,
        confidence,
        sources,
        answer_type,
    })
}

/// Numbered source blocks for grounding the generation prompt
fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[Source {}] ({}) ID: {}\nTitle: {}\nContent: {}\n",
                i + 1,
                r.doc_type,
                r.id,
                r.title,
                r.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Extractive answer from the top result; the degraded-mode guarantee
fn build_fallback_answer(results: &[SearchResult]) -> String {
    let top = &results[0];
    format!(
        "**Best match** ({}): **{}**\n\nID: `{}` | Relevance: {:.0}%\n\n{}",
        top.doc_type,
        top.title,
        top.id,
        top.score * 100.0,
        truncate_graphemes(&top.snippet, FALLBACK_EXCERPT_CHARS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::index::{IndexDocument, MemoryIndex, SemanticIndex};
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn doc(id: &str, title: &str, text: &str) -> IndexDocument {
        let mut meta = Map::new();
        meta.insert("title".to_string(), Value::String(title.to_string()));
        IndexDocument::new(id, text, meta)
    }

    #[tokio::test]
    async fn test_empty_index_yields_unknown_answer() {
        let index = MemoryIndex::new(Arc::new(HashEmbedder::new(64)), 32, 500);
        let result = answer(&index, None, "how do I reset the cache?", &AskOptions::default())
            .await
            .unwrap();

        assert_eq!(result.answer_type, AnswerKind::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.sources.is_empty());
        assert!(result.answer.contains("escalate"));
    }

    #[tokio::test]
    async fn test_fallback_answer_is_well_formed() {
        let index = MemoryIndex::new(Arc::new(HashEmbedder::new(256)), 32, 500);
        index
            .upsert(
                DocType::KbArticle,
                doc("KB-7", "Cache reset", "Reset the tenant cache from the admin panel."),
            )
            .await
            .unwrap();

        let result = answer(&index, None, "reset tenant cache", &AskOptions::default())
            .await
            .unwrap();

        assert_eq!(result.answer_type, AnswerKind::Kb);
        assert!(result.confidence > 0.0);
        assert!(result.answer.contains("**Best match**"));
        assert!(result.answer.contains("KB-7"));
        assert!(!result.answer.is_empty());
    }

    #[tokio::test]
    async fn test_answer_type_follows_top_result() {
        let index = MemoryIndex::new(Arc::new(HashEmbedder::new(256)), 32, 500);
        index
            .upsert(
                DocType::Script,
                doc("SCR-4", "Rebuild ledger", "rebuild the tenant ledger totals"),
            )
            .await
            .unwrap();

        let result = answer(
            &index,
            None,
            "rebuild the tenant ledger totals",
            &AskOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.answer_type, AnswerKind::Script);
    }

    #[tokio::test]
    async fn test_sources_capped_at_five() {
        let index = MemoryIndex::new(Arc::new(HashEmbedder::new(256)), 32, 500);
        for i in 0..8 {
            index
                .upsert(
                    DocType::Ticket,
                    doc(&format!("T-{}", i), "Cache issue", "tenant cache stale balances issue"),
                )
                .await
                .unwrap();
        }

        let options = AskOptions {
            top_k: 8,
            ..Default::default()
        };
        let result = answer(&index, None, "tenant cache stale", &options).await.unwrap();
        assert!(result.sources.len() <= 5);
    }

    #[test]
    fn test_answer_kind_serializes_like_the_api() {
        assert_eq!(serde_json::to_string(&AnswerKind::Kb).unwrap(), "\"KB\"");
        assert_eq!(
            serde_json::to_string(&AnswerKind::TicketResolution).unwrap(),
            "\"TICKET_RESOLUTION\""
        );
    }
}
