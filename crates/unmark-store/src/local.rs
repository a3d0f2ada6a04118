//! Device-local collections: result payloads and the singleton quota row.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use unmark_shared::{EntryId, HistoryEntry, Identity, QuotaRecord, ResultReference};
use uuid::Uuid;

use crate::database::{format_date, format_ts, parse_date, parse_ts, Database};
use crate::error::{not_found, Result, StoreError};

impl Database {
    pub fn insert_local_image(&self, entry: &HistoryEntry) -> Result<()> {
        let payload = entry
            .result
            .payload()
            .ok_or_else(|| StoreError::InvalidKey("local entries need a payload".into()))?;

        self.conn().execute(
            "INSERT INTO images (id, payload, original_name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.id.to_string(),
                payload,
                entry.source_reference,
                format_ts(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_local_image(&self, id: EntryId) -> Result<HistoryEntry> {
        self.conn()
            .query_row(
                "SELECT id, payload, original_name, created_at FROM images WHERE id = ?1",
                params![id.to_string()],
                row_to_local_entry,
            )
            .map_err(not_found)
    }

    pub fn list_local_images(&self, limit: u32, offset: u32) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, payload, original_name, created_at
             FROM images
             ORDER BY created_at DESC, seq DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], row_to_local_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// The device quota row, if one was ever written.
    pub fn get_local_session(&self) -> Result<Option<QuotaRecord>> {
        let row = self
            .conn()
            .query_row(
                "SELECT daily_count, last_reset_date FROM session WHERE id = 'current'",
                [],
                |row| {
                    let count: u32 = row.get(0)?;
                    let date: String = row.get(1)?;
                    Ok((count, parse_date(1, &date)?))
                },
            )
            .optional()?;

        Ok(row.map(|(daily_count, last_reset_date)| QuotaRecord {
            identity: Identity::local(),
            daily_count,
            last_reset_date,
        }))
    }

    pub fn put_local_session(&self, daily_count: u32, last_reset_date: NaiveDate) -> Result<()> {
        self.conn().execute(
            "INSERT INTO session (id, daily_count, last_reset_date) VALUES ('current', ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                daily_count = excluded.daily_count,
                last_reset_date = excluded.last_reset_date",
            params![daily_count, format_date(last_reset_date)],
        )?;
        Ok(())
    }

    /// Add one use for `today`, restarting the count if the row is stale.
    pub fn increment_local_session(&self, today: NaiveDate) -> Result<QuotaRecord> {
        self.conn().execute(
            "INSERT INTO session (id, daily_count, last_reset_date) VALUES ('current', 1, ?1)
             ON CONFLICT(id) DO UPDATE SET
                daily_count = CASE WHEN last_reset_date = excluded.last_reset_date
                                   THEN daily_count + 1 ELSE 1 END,
                last_reset_date = excluded.last_reset_date",
            params![format_date(today)],
        )?;
        self.get_local_session()?.ok_or(StoreError::NotFound)
    }
}

fn row_to_local_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let id_str: String = row.get(0)?;
    let payload: Vec<u8> = row.get(1)?;
    let original_name: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(HistoryEntry {
        id: EntryId(id),
        identity: Identity::local(),
        source_reference: original_name,
        result: ResultReference::Payload(payload),
        created_at: parse_ts(3, &created_str)?,
        share_slug: None,
    })
}
