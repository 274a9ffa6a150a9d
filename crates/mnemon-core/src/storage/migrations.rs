//! Database Migrations
//!
//! Schema migration definitions for the reference SQLite adapter.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: banks, facts, entities, links, FTS5",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Occurrence-time range index for temporal retrieval",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
-- Banks are the isolation boundary; every other table is scoped by bank_id.
CREATE TABLE IF NOT EXISTS banks (
    id TEXT PRIMARY KEY,
    embedding_dimension INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id),
    fact_type TEXT NOT NULL DEFAULT 'world',
    text TEXT NOT NULL,
    context TEXT,
    embedding BLOB NOT NULL,
    occurred_start TEXT,
    occurred_end TEXT,
    mentioned_at TEXT NOT NULL,
    document_id TEXT,
    chunk_id TEXT,
    tags TEXT DEFAULT '{}',
    metadata TEXT DEFAULT '{}',
    confidence REAL
);

CREATE INDEX IF NOT EXISTS idx_facts_bank ON facts(bank_id);
CREATE INDEX IF NOT EXISTS idx_facts_bank_type ON facts(bank_id, fact_type);
CREATE INDEX IF NOT EXISTS idx_facts_mentioned ON facts(bank_id, mentioned_at);

CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    bank_id TEXT NOT NULL REFERENCES banks(id),
    canonical_name TEXT NOT NULL,
    mention_count INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_bank ON entities(bank_id);

-- Directed typed edges between facts. Weights live in (0, 1].
CREATE TABLE IF NOT EXISTS links (
    source_id TEXT NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL,
    weight REAL NOT NULL,
    PRIMARY KEY (source_id, target_id, link_type)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);

CREATE TABLE IF NOT EXISTS fact_entities (
    fact_id TEXT NOT NULL REFERENCES facts(id) ON DELETE CASCADE,
    entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    PRIMARY KEY (fact_id, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_fact_entities_entity ON fact_entities(entity_id);

-- FTS5 inverted index over text and context, kept in sync by triggers
CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
    id UNINDEXED,
    text,
    context,
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS facts_fts_insert AFTER INSERT ON facts BEGIN
    INSERT INTO facts_fts(id, text, context)
    VALUES (new.id, new.text, COALESCE(new.context, ''));
END;

CREATE TRIGGER IF NOT EXISTS facts_fts_delete AFTER DELETE ON facts BEGIN
    DELETE FROM facts_fts WHERE id = old.id;
END;
"#;

/// V2: btree on (bank_id, occurred_start) for range filtering
const MIGRATION_V2_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_facts_occurred ON facts(bank_id, occurred_start);
"#;
