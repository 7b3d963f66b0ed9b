//! supportmind: self-learning support knowledge core
//!
//! Loads a fixed corpus of tickets, conversations, scripts, and KB articles;
//! answers questions by semantic retrieval with grounded summarization;
//! detects knowledge gaps in resolved cases; and routes gap-closing drafts
//! through a human-approval workflow that updates the KB, its search index,
//! and its provenance graph as one ordered transition.

pub mod app;
pub mod commands;
pub mod config;
pub mod copilot;
pub mod corpus;
pub mod draft;
pub mod embed;
pub mod error;
pub mod gaps;
pub mod generate;
pub mod index;
pub mod ledger;
pub mod retrieval;
pub mod review;
