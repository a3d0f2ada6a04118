//! The quota-gated processing pipeline.
//!
//! Order is fixed: quota check, remote transform, result write, history
//! append, quota increment. Nothing after the transform is rolled back.

use std::sync::Arc;

use chrono::SubsecRound;
use tracing::{error, info, warn};
use unmark_shared::constants::DAILY_LIMIT;
use unmark_shared::validation::{ImageKind, ImageUpload};
use unmark_shared::{Clock, EntryId, HistoryEntry, Identity, UnmarkError};
use unmark_store::{Backend, StoreError};

use crate::transform::Transformer;

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Processed {
    pub entry: HistoryEntry,
    pub remaining_today: u32,
}

pub struct Processor<B: ?Sized> {
    backend: Arc<B>,
    transformer: Arc<dyn Transformer>,
    clock: Arc<dyn Clock>,
}

impl<B: ?Sized> Clone for Processor<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            transformer: self.transformer.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<B: Backend + ?Sized> Processor<B> {
    pub fn new(backend: Arc<B>, transformer: Arc<dyn Transformer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            transformer,
            clock,
        }
    }

    /// Run one validated upload through the pipeline for `identity`.
    pub async fn process(
        &self,
        identity: &Identity,
        upload: &ImageUpload,
        source_reference: &str,
    ) -> Result<Processed, UnmarkError> {
        let today = self.clock.today();

        let quota = self
            .backend
            .read_quota(identity, today)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => UnmarkError::IdentityNotFound,
                other => UnmarkError::Store(other.to_string()),
            })?;

        if quota.is_exhausted(DAILY_LIMIT) {
            info!(identity = %identity.short(), count = quota.daily_count, "Daily limit reached");
            return Err(UnmarkError::QuotaExceeded { limit: DAILY_LIMIT });
        }

        let output = self.transformer.transform(upload).await.map_err(|e| {
            let err = UnmarkError::Upstream(e.to_string());
            warn!(class = err.class(), identity = %identity.short(), error = %e, "Transformation failed");
            err
        })?;

        let kind = ImageKind::sniff(&output).ok_or_else(|| {
            let err = UnmarkError::Upstream("unusable image returned".into());
            warn!(
                class = err.class(),
                identity = %identity.short(),
                size = output.len(),
                "Transformation returned an unusable payload"
            );
            err
        })?;

        let id = EntryId::new();
        let result = self
            .backend
            .store_result(id, kind, output)
            .await
            .map_err(|e| persistence_failure("object_write", identity, id, e))?;

        let entry = HistoryEntry {
            id,
            identity: identity.clone(),
            source_reference: source_reference.to_string(),
            result,
            created_at: self.clock.now().trunc_subsecs(6),
            share_slug: None,
        };
        self.backend
            .append(&entry)
            .await
            .map_err(|e| persistence_failure("history_append", identity, id, e))?;

        // The entry stays even if counting fails: an under-counted quota is
        // preferred over losing a finished result.
        // The transformation may have run past midnight.
        let remaining_today = match self.backend.increment(identity, self.clock.today()).await {
            Ok(record) => record.remaining(DAILY_LIMIT),
            Err(e) => {
                persistence_failure("quota_increment", identity, id, e);
                quota.remaining(DAILY_LIMIT).saturating_sub(1)
            }
        };

        info!(
            identity = %identity.short(),
            entry_id = %id,
            remaining = remaining_today,
            "Image processed"
        );

        Ok(Processed {
            entry,
            remaining_today,
        })
    }
}

fn persistence_failure(
    stage: &'static str,
    identity: &Identity,
    id: EntryId,
    e: StoreError,
) -> UnmarkError {
    let err = UnmarkError::Persistence(e.to_string());
    error!(
        class = err.class(),
        stage,
        identity = %identity.short(),
        entry_id = %id,
        error = %e,
        "Persistence failed after a successful transformation"
    );
    err
}
