//! v001 -- Server-side schema.
//!
//! `sessions` holds one quota row per anonymous identity, `processed_images`
//! one row per completed transformation.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Sessions (per-identity quota)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    identity        TEXT PRIMARY KEY NOT NULL,
    daily_count     INTEGER NOT NULL DEFAULT 0,
    last_reset_date TEXT NOT NULL,             -- YYYY-MM-DD (UTC)
    created_at      TEXT NOT NULL              -- RFC-3339
);

-- ----------------------------------------------------------------
-- Processed images (history)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS processed_images (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
    id               TEXT NOT NULL UNIQUE,               -- UUID v4
    identity         TEXT NOT NULL,                      -- FK -> sessions(identity)
    source_reference TEXT NOT NULL,
    result_url       TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    is_public        INTEGER NOT NULL DEFAULT 0,         -- boolean 0/1
    share_slug       TEXT UNIQUE,

    FOREIGN KEY (identity) REFERENCES sessions(identity),
    CHECK ((is_public = 0 AND share_slug IS NULL) OR (is_public = 1 AND share_slug IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_processed_images_identity_created
    ON processed_images(identity, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_processed_images_public_created
    ON processed_images(is_public, created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
