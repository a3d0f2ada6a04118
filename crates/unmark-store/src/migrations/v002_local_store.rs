//! v002 -- Device-local collections.
//!
//! `images` keeps result payloads keyed by entry id; `session` is a singleton
//! row holding the device's daily counter.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    id            TEXT NOT NULL UNIQUE,       -- UUID v4
    payload       BLOB NOT NULL,              -- result image bytes
    original_name TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_created ON images(created_at DESC);

CREATE TABLE IF NOT EXISTS session (
    id              TEXT PRIMARY KEY NOT NULL CHECK (id = 'current'),
    daily_count     INTEGER NOT NULL,
    last_reset_date TEXT NOT NULL
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
