//! Server-side history rows ([`HistoryEntry`] with a hosted result URL).

use rusqlite::params;
use unmark_shared::{EntryId, HistoryEntry, Identity, ResultReference, ShareSlug};
use uuid::Uuid;

use crate::database::{format_ts, parse_ts, Database};
use crate::error::{not_found, Result, StoreError};

const SELECT_COLUMNS: &str =
    "SELECT id, identity, source_reference, result_url, created_at, share_slug FROM processed_images";

impl Database {
    /// Insert a new history row. The entry must carry a URL result.
    pub fn insert_image(&self, entry: &HistoryEntry) -> Result<()> {
        let url = entry
            .result
            .url()
            .ok_or_else(|| StoreError::InvalidKey("server entries need a result URL".into()))?;

        self.conn().execute(
            "INSERT INTO processed_images
                (id, identity, source_reference, result_url, created_at, is_public, share_slug)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id.to_string(),
                entry.identity.as_str(),
                entry.source_reference,
                url,
                format_ts(&entry.created_at),
                entry.is_public() as i32,
                entry.share_slug.as_ref().map(|s| s.as_str()),
            ],
        )?;
        Ok(())
    }

    pub fn get_image(&self, id: EntryId) -> Result<HistoryEntry> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.to_string()],
                row_to_entry,
            )
            .map_err(not_found)
    }

    /// Newest first; ties fall back to insertion order.
    pub fn list_images_for_identity(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE identity = ?1
             ORDER BY created_at DESC, seq DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![identity.as_str(), limit, offset], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn list_public_images(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE is_public = 1
             ORDER BY created_at DESC, seq DESC
             LIMIT ?1"
        ))?;

        let rows = stmt.query_map(params![limit], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn get_image_by_slug(&self, slug: &str) -> Result<HistoryEntry> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE share_slug = ?1 AND is_public = 1"),
                params![slug],
                row_to_entry,
            )
            .map_err(not_found)
    }

    /// One-way private -> public transition.
    ///
    /// Returns `false` when the row was already public (or does not exist);
    /// an existing slug is never overwritten. A slug already used by another
    /// row fails on the unique index.
    pub fn publish_image(&self, id: EntryId, slug: &ShareSlug) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE processed_images SET is_public = 1, share_slug = ?2
             WHERE id = ?1 AND share_slug IS NULL",
            params![id.to_string(), slug.as_str()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let id_str: String = row.get(0)?;
    let identity: String = row.get(1)?;
    let source_reference: String = row.get(2)?;
    let result_url: String = row.get(3)?;
    let created_str: String = row.get(4)?;
    let share_slug: Option<String> = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let identity = Identity::parse(&identity).ok_or(rusqlite::Error::InvalidColumnType(
        1,
        "identity".into(),
        rusqlite::types::Type::Text,
    ))?;

    Ok(HistoryEntry {
        id: EntryId(id),
        identity,
        source_reference,
        result: ResultReference::Url(result_url),
        created_at: parse_ts(4, &created_str)?,
        share_slug: share_slug.map(ShareSlug::from_stored),
    })
}
