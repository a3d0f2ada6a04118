//! Read paths: the initial session load, paged history and the public feed.

use std::sync::Arc;

use unmark_shared::constants::{DAILY_LIMIT, DEFAULT_HISTORY_PAGE, MAX_HISTORY_PAGE, PUBLIC_FEED_CAP};
use unmark_shared::{Clock, EntryId, HistoryEntry, Identity, UnmarkError};
use unmark_store::{Backend, ShareBackend};

use crate::read_error;

/// Quota and the newest entries, returned together on first load.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub remaining_today: u32,
    pub entries: Vec<HistoryEntry>,
}

pub struct HistoryReader<B: ?Sized> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B: ?Sized> Clone for HistoryReader<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<B: Backend + ?Sized> HistoryReader<B> {
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Register `identity` if needed, then return its quota and newest entries.
    pub async fn get_history(&self, identity: &Identity) -> Result<HistorySnapshot, UnmarkError> {
        let quota = self
            .backend
            .open_session(identity, self.clock.today())
            .await
            .map_err(read_error)?;

        let entries = self.list(identity, DEFAULT_HISTORY_PAGE, 0).await?;

        Ok(HistorySnapshot {
            remaining_today: quota.remaining(DAILY_LIMIT),
            entries,
        })
    }

    /// Remaining uses today, registering `identity` if needed.
    pub async fn remaining_today(&self, identity: &Identity) -> Result<u32, UnmarkError> {
        let quota = self
            .backend
            .open_session(identity, self.clock.today())
            .await
            .map_err(read_error)?;
        Ok(quota.remaining(DAILY_LIMIT))
    }

    /// A page of `identity`'s history, newest first.
    pub async fn list(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<HistoryEntry>, UnmarkError> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        self.backend
            .list_by_identity(identity, limit, offset)
            .await
            .map_err(read_error)
    }

    pub async fn get(&self, id: EntryId) -> Result<HistoryEntry, UnmarkError> {
        self.backend.get(id).await.map_err(read_error)
    }
}

impl<B: ShareBackend + ?Sized> HistoryReader<B> {
    /// Every public entry, newest first, capped.
    pub async fn public_feed(&self) -> Result<Vec<HistoryEntry>, UnmarkError> {
        self.backend
            .public_feed(PUBLIC_FEED_CAP)
            .await
            .map_err(read_error)
    }

    /// Resolve a share link.
    pub async fn get_shared(&self, slug: &str) -> Result<HistoryEntry, UnmarkError> {
        self.backend.get_by_slug(slug).await.map_err(read_error)
    }
}
