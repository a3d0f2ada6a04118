use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;
use unmark_shared::validation::ImageKind;
use unmark_shared::{EntryId, HistoryEntry, Identity, QuotaRecord, ResultReference};

use crate::backend::Backend;
use crate::database::Database;
use crate::error::{Result, StoreError};

/// Device-scoped storage. The identity argument is ignored: everything in
/// the database belongs to the device.
pub struct LocalBackend {
    db: Mutex<Database>,
}

impl LocalBackend {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn open_session(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord> {
        self.read_quota(identity, today).await
    }

    async fn read_quota(&self, _identity: &Identity, today: NaiveDate) -> Result<QuotaRecord> {
        let db = self.db()?;
        match db.get_local_session()? {
            None => Ok(QuotaRecord::fresh(Identity::local(), today)),
            Some(record) if record.is_stale(today) => {
                debug!(last = %record.last_reset_date, "Resetting local daily count");
                db.put_local_session(0, today)?;
                Ok(record.current(today))
            }
            Some(record) => Ok(record),
        }
    }

    async fn increment(&self, _identity: &Identity, today: NaiveDate) -> Result<QuotaRecord> {
        self.db()?.increment_local_session(today)
    }

    /// The payload is owned by the history row, so it is persisted by
    /// [`append`](Backend::append) in the same insert.
    async fn store_result(
        &self,
        _id: EntryId,
        _kind: ImageKind,
        bytes: Vec<u8>,
    ) -> Result<ResultReference> {
        Ok(ResultReference::Payload(bytes))
    }

    async fn append(&self, entry: &HistoryEntry) -> Result<EntryId> {
        self.db()?.insert_local_image(entry)?;
        Ok(entry.id)
    }

    async fn list_by_identity(
        &self,
        _identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<HistoryEntry>> {
        self.db()?.list_local_images(limit, offset)
    }

    async fn get(&self, id: EntryId) -> Result<HistoryEntry> {
        self.db()?.get_local_image(id)
    }
}
