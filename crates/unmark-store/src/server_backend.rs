use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info};
use unmark_shared::validation::ImageKind;
use unmark_shared::{EntryId, HistoryEntry, Identity, QuotaRecord, ResultReference, ShareSlug};

use crate::backend::{Backend, ShareBackend};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::object_store::ObjectStore;

/// Server-authoritative storage: SQLite rows plus hosted objects.
pub struct ServerBackend {
    db: Mutex<Database>,
    objects: ObjectStore,
}

impl ServerBackend {
    pub fn new(db: Database, objects: ObjectStore) -> Self {
        Self {
            db: Mutex::new(db),
            objects,
        }
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl Backend for ServerBackend {
    async fn open_session(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord> {
        let created = self.db()?.insert_session(identity, today, Utc::now())?;
        if created {
            info!(identity = %identity.short(), "Registered new identity");
        }
        self.read_quota(identity, today).await
    }

    async fn read_quota(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord> {
        let db = self.db()?;
        let record = db.get_session(identity)?.ok_or(StoreError::NotFound)?;
        if record.is_stale(today) {
            debug!(identity = %identity.short(), last = %record.last_reset_date, "Resetting daily count");
            db.reset_session(identity, today)?;
        }
        Ok(record.current(today))
    }

    async fn increment(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord> {
        self.db()?.increment_session(identity, today)
    }

    async fn store_result(
        &self,
        id: EntryId,
        kind: ImageKind,
        bytes: Vec<u8>,
    ) -> Result<ResultReference> {
        let key = self.objects.put(id.0, kind, &bytes).await?;
        Ok(ResultReference::Url(self.objects.url_for(&key)))
    }

    async fn append(&self, entry: &HistoryEntry) -> Result<EntryId> {
        self.db()?.insert_image(entry)?;
        Ok(entry.id)
    }

    async fn list_by_identity(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<HistoryEntry>> {
        self.db()?.list_images_for_identity(identity, limit, offset)
    }

    async fn get(&self, id: EntryId) -> Result<HistoryEntry> {
        self.db()?.get_image(id)
    }
}

#[async_trait]
impl ShareBackend for ServerBackend {
    async fn mark_public(&self, id: EntryId, slug: &ShareSlug) -> Result<bool> {
        self.db()?.publish_image(id, slug)
    }

    async fn public_feed(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        self.db()?.list_public_images(limit)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<HistoryEntry> {
        self.db()?.get_image_by_slug(slug)
    }
}
