//! SQL schema for the Vigil SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Canonical events are never deleted; they only move through their status.
CREATE TABLE IF NOT EXISTS canonical_events (
    event_id         TEXT PRIMARY KEY,
    dedup_key        TEXT NOT NULL,
    title            TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    event_date       TEXT NOT NULL,   -- YYYY-MM-DD
    event_type       TEXT,
    severity         TEXT,
    records_affected INTEGER,
    status           TEXT NOT NULL
                     CHECK (status IN ('active', 'contained', 'resolved')),
    confidence       REAL NOT NULL CHECK (confidence BETWEEN 0.0 AND 1.0),
    created_at       TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at       TEXT NOT NULL    -- RFC 3339 UTC; optimistic write guard
);

-- At most one Active event per dedup key.
CREATE UNIQUE INDEX IF NOT EXISTS canonical_events_active_key
    ON canonical_events(dedup_key) WHERE status = 'active';
CREATE INDEX IF NOT EXISTS canonical_events_date_idx
    ON canonical_events(event_date);

CREATE TRIGGER IF NOT EXISTS canonical_events_no_delete
BEFORE DELETE ON canonical_events
BEGIN
    SELECT RAISE(ABORT, 'canonical events are never deleted');
END;

CREATE TABLE IF NOT EXISTS entities (
    entity_id      TEXT PRIMARY KEY,
    canonical_name TEXT NOT NULL UNIQUE,
    entity_type    TEXT,
    industry       TEXT
);

-- Administered externally; the engine only reads it.
CREATE TABLE IF NOT EXISTS entity_mappings (
    source_entity     TEXT PRIMARY KEY,
    canonical_entity  TEXT NOT NULL,
    relationship_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS event_entities (
    event_id   TEXT NOT NULL REFERENCES canonical_events(event_id),
    entity_id  TEXT NOT NULL REFERENCES entities(entity_id),
    is_primary INTEGER NOT NULL DEFAULT 0,
    confidence REAL NOT NULL,
    PRIMARY KEY (event_id, entity_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS event_entities_one_primary
    ON event_entities(event_id) WHERE is_primary = 1;

-- Sources are write-once; a URL identifies one report store-wide.
CREATE TABLE IF NOT EXISTS event_sources (
    source_id         TEXT PRIMARY KEY,
    event_id          TEXT NOT NULL REFERENCES canonical_events(event_id),
    source_type       TEXT NOT NULL,
    url               TEXT NOT NULL UNIQUE,
    published_date    TEXT,
    retrieved_date    TEXT NOT NULL,
    raw_title         TEXT NOT NULL,
    raw_content       TEXT NOT NULL DEFAULT '',
    credibility_score REAL NOT NULL,
    relevance_score   REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS event_sources_event_idx ON event_sources(event_id);

CREATE TRIGGER IF NOT EXISTS event_sources_no_update
BEFORE UPDATE ON event_sources
BEGIN
    SELECT RAISE(ABORT, 'event sources are write-once');
END;

CREATE TRIGGER IF NOT EXISTS event_sources_no_delete
BEFORE DELETE ON event_sources
BEGIN
    SELECT RAISE(ABORT, 'event sources are write-once');
END;

-- Strictly append-only. `seq` fixes chronological order.
CREATE TABLE IF NOT EXISTS attribute_history (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id        TEXT NOT NULL UNIQUE,
    event_id        TEXT NOT NULL REFERENCES canonical_events(event_id),
    event_source_id TEXT REFERENCES event_sources(source_id),  -- NULL: operator
    attribute_name  TEXT NOT NULL,
    old_value       TEXT,
    new_value       TEXT,
    changed_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS attribute_history_event_idx
    ON attribute_history(event_id, seq);

CREATE TRIGGER IF NOT EXISTS attribute_history_no_update
BEFORE UPDATE ON attribute_history
BEGIN
    SELECT RAISE(ABORT, 'attribute history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS attribute_history_no_delete
BEFORE DELETE ON attribute_history
BEGIN
    SELECT RAISE(ABORT, 'attribute history is append-only');
END;

PRAGMA user_version = 1;
";
