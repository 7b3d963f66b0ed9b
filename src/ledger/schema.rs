//! SQLite schema definition

/// SQL schema for the knowledge ledger database
pub const SCHEMA_SQL: &str = r#"
-- KB articles: source of truth for article content
CREATE TABLE IF NOT EXISTS kb_articles (
    kb_article_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '',
    module TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    source_type TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Lineage: provenance edges linking articles to source artifacts.
-- Append-only; the UNIQUE constraint enforces 4-tuple dedup.
CREATE TABLE IF NOT EXISTS kb_lineage (
    kb_article_id TEXT NOT NULL,
    source_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    relationship TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(kb_article_id, source_id, source_type, relationship)
);

-- Learning events: detected gaps and reported questions under review
CREATE TABLE IF NOT EXISTS learning_events (
    event_id TEXT PRIMARY KEY,
    ticket_number TEXT NOT NULL DEFAULT '',
    conversation_id TEXT NOT NULL DEFAULT '',
    detected_gap TEXT NOT NULL DEFAULT '',
    proposed_kb_id TEXT NOT NULL DEFAULT '',
    draft_summary TEXT NOT NULL DEFAULT '',
    draft_json TEXT,
    source_question TEXT NOT NULL DEFAULT '',
    reported_confidence REAL,
    best_kb_score REAL,
    best_kb_match TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'Pending',
    reviewer_role TEXT NOT NULL DEFAULT '',
    review_notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    reviewed_at TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_lineage_article ON kb_lineage(kb_article_id);
CREATE INDEX IF NOT EXISTS idx_events_status ON learning_events(status);
CREATE INDEX IF NOT EXISTS idx_events_ticket ON learning_events(ticket_number);
"#;
