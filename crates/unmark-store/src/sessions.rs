//! Server-side quota rows, one per identity.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use unmark_shared::{Identity, QuotaRecord};

use crate::database::{format_date, format_ts, parse_date, Database};
use crate::error::{Result, StoreError};

impl Database {
    /// Fetch the raw quota row for `identity`, stale or not.
    pub fn get_session(&self, identity: &Identity) -> Result<Option<QuotaRecord>> {
        let row = self
            .conn()
            .query_row(
                "SELECT daily_count, last_reset_date FROM sessions WHERE identity = ?1",
                params![identity.as_str()],
                |row| {
                    let count: u32 = row.get(0)?;
                    let date: String = row.get(1)?;
                    Ok((count, parse_date(1, &date)?))
                },
            )
            .optional()?;

        Ok(row.map(|(daily_count, last_reset_date)| QuotaRecord {
            identity: identity.clone(),
            daily_count,
            last_reset_date,
        }))
    }

    /// Create a zeroed row for `identity` unless one exists.
    pub fn insert_session(
        &self,
        identity: &Identity,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO sessions (identity, daily_count, last_reset_date, created_at)
             VALUES (?1, 0, ?2, ?3)",
            params![identity.as_str(), format_date(today), format_ts(&now)],
        )?;
        Ok(affected > 0)
    }

    /// Zero the counter and move the reset date to `today`.
    pub fn reset_session(&self, identity: &Identity, today: NaiveDate) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE sessions SET daily_count = 0, last_reset_date = ?2 WHERE identity = ?1",
            params![identity.as_str(), format_date(today)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Add one use for `today`, applying the lazy reset in the same statement.
    pub fn increment_session(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord> {
        let affected = self.conn().execute(
            "UPDATE sessions SET
                daily_count = CASE WHEN last_reset_date = ?2 THEN daily_count + 1 ELSE 1 END,
                last_reset_date = ?2
             WHERE identity = ?1",
            params![identity.as_str(), format_date(today)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_session(identity)?.ok_or(StoreError::NotFound)
    }
}
