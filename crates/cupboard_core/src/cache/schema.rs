//! Cache schema.
//!
//! Defined once per attach on a fresh database file. Constraints mirror the
//! entity invariants so the loader can reject rows that break them.

use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE properties (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT,
    value_type  TEXT NOT NULL
                CHECK (value_type IN ('text', 'integer', 'boolean', 'timestamp', 'list', 'categorical')),
    created_at  TEXT NOT NULL
);

CREATE TABLE categories (
    id          TEXT PRIMARY KEY,
    property_id TEXT NOT NULL REFERENCES properties(id),
    name        TEXT NOT NULL,
    ordinal     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (property_id, name)
);

CREATE TABLE crumbs (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    state       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE crumb_properties (
    crumb_id    TEXT NOT NULL REFERENCES crumbs(id),
    property_id TEXT NOT NULL REFERENCES properties(id),
    value_type  TEXT NOT NULL,
    value       TEXT,
    PRIMARY KEY (crumb_id, property_id)
);

CREATE TABLE trails (
    id           TEXT PRIMARY KEY,
    state        TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE links (
    id          TEXT PRIMARY KEY,
    link_type   TEXT NOT NULL,
    from_id     TEXT NOT NULL,
    to_id       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (link_type, from_id, to_id)
);

CREATE TABLE metadata (
    id          TEXT PRIMARY KEY,
    table_name  TEXT NOT NULL,
    crumb_id    TEXT NOT NULL REFERENCES crumbs(id),
    property_id TEXT REFERENCES properties(id),
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE stashes (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    stash_type  TEXT NOT NULL,
    value       TEXT,
    version     INTEGER NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE stash_history (
    id          TEXT PRIMARY KEY,
    stash_id    TEXT NOT NULL,
    version     INTEGER NOT NULL,
    value       TEXT,
    operation   TEXT NOT NULL,
    changed_by  TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_crumbs_state ON crumbs(state);
CREATE INDEX idx_categories_property ON categories(property_id);
CREATE INDEX idx_crumb_properties_property ON crumb_properties(property_id);
CREATE INDEX idx_links_from ON links(from_id);
CREATE INDEX idx_links_to ON links(to_id);
CREATE INDEX idx_metadata_crumb ON metadata(crumb_id);
CREATE INDEX idx_stash_history_stash ON stash_history(stash_id);
"#;

/// Creates every cache table and index.
pub(crate) fn install(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
