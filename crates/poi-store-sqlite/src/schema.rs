//! SQL schema for the POI SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS poi (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,    -- natural key for upserts
    parent_id       INTEGER REFERENCES poi(id),
    description     TEXT,
    href            TEXT,
    level           INTEGER NOT NULL DEFAULT 0,   -- derived from parent chain
    weight          INTEGER NOT NULL DEFAULT 0,
    pinyin_initials TEXT NOT NULL DEFAULT ''      -- derived from name
);

CREATE TABLE IF NOT EXISTS tag (
    tag_id          INTEGER PRIMARY KEY,
    tag_name        TEXT NOT NULL UNIQUE,
    pinyin_initials TEXT NOT NULL DEFAULT ''
);

-- Mutated only by tag reconciliation and tag deletion.
CREATE TABLE IF NOT EXISTS poi_tag (
    poi_id INTEGER NOT NULL REFERENCES poi(id),
    tag_id INTEGER NOT NULL REFERENCES tag(tag_id),
    UNIQUE (poi_id, tag_id)
);

-- Reference rows, populated out of band.
CREATE TABLE IF NOT EXISTS target_audience (
    id              INTEGER PRIMARY KEY,
    target_audience TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS recommend_reason (
    id                 INTEGER PRIMARY KEY,
    poi_id             INTEGER NOT NULL REFERENCES poi(id),
    target_audience_id INTEGER NOT NULL REFERENCES target_audience(id),
    reason             TEXT NOT NULL
);

-- Append-only; pruned by age.
CREATE TABLE IF NOT EXISTS history (
    id        INTEGER PRIMARY KEY,
    tag_id    INTEGER NOT NULL,
    used_time INTEGER NOT NULL    -- unix seconds
);

-- Staged change requests; independent of the catalogue tables.
CREATE TABLE IF NOT EXISTS pending_update (
    id        INTEGER PRIMARY KEY,
    event     TEXT NOT NULL,
    data      TEXT NOT NULL,
    auth_code TEXT,
    timestamp TEXT NOT NULL       -- RFC 3339 UTC
);

CREATE INDEX IF NOT EXISTS poi_parent_idx      ON poi(parent_id);
CREATE INDEX IF NOT EXISTS poi_tag_tag_idx     ON poi_tag(tag_id);
CREATE INDEX IF NOT EXISTS recommend_poi_idx   ON recommend_reason(poi_id);
CREATE INDEX IF NOT EXISTS history_used_idx    ON history(used_time);

PRAGMA user_version = 1;
";
