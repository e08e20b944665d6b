//! Index schema definitions.

/// Main schema SQL for initializing the index file.
pub const SCHEMA: &str = r#"
-- Named collections
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

-- One record per (collection, id); id is the table name
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dimension INTEGER NOT NULL,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    content_hash BLOB,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
