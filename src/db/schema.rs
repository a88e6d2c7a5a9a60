/// Schema for cache tiers, the offline queue and agent metadata.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named, versioned tier (e.g. "static-assets-v3")
CREATE TABLE IF NOT EXISTS cache_tiers (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached GET responses, keyed by a digest of method + URL
CREATE TABLE IF NOT EXISTS cache_entries (
    tier TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    inserted_at TEXT NOT NULL,
    PRIMARY KEY (tier, key_hash),
    FOREIGN KEY (tier) REFERENCES cache_tiers(name) ON DELETE CASCADE
);

-- Mutations that failed while offline, replayed per category in id order
CREATE TABLE IF NOT EXISTS queued_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queued_operations_category
    ON queued_operations(category, id);

CREATE TABLE IF NOT EXISTS agent_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
