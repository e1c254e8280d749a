//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `articles`, `users`, and `feeds`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Articles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS articles (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    cid           TEXT NOT NULL DEFAULT '',   -- content identifier
    title         TEXT NOT NULL,
    body          TEXT NOT NULL,
    author        TEXT NOT NULL,
    author_pubkey TEXT NOT NULL,              -- base64 Ed25519
    origin        TEXT NOT NULL DEFAULT '',
    signature     TEXT NOT NULL DEFAULT '',   -- base64 Ed25519
    timestamp     TEXT NOT NULL,              -- RFC-3339
    tags          TEXT NOT NULL DEFAULT '[]', -- JSON array
    category      TEXT NOT NULL DEFAULT '',
    version       INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_cid ON articles(cid);
CREATE INDEX IF NOT EXISTS idx_articles_ts ON articles(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_articles_author_ts
    ON articles(author, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category);

-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,  -- PeerId of the user pubkey
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,              -- argon2 PHC string
    public_key    TEXT NOT NULL,              -- base64 Ed25519
    private_key   TEXT NOT NULL,              -- encrypted keystore envelope
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Feeds
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS feeds (
    id              TEXT PRIMARY KEY NOT NULL, -- UUID v4
    name            TEXT NOT NULL UNIQUE,
    pointer_key     TEXT NOT NULL,
    pointer_address TEXT NOT NULL DEFAULT '',
    last_cid        TEXT NOT NULL DEFAULT '',
    last_sync       TEXT,                      -- RFC-3339, null until first sync
    sync_interval   INTEGER NOT NULL,          -- minutes
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
