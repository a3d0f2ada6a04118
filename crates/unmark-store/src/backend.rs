//! The storage contract shared by both modes.
//!
//! [`Backend`] covers quota and history and is implemented by
//! [`ServerBackend`](crate::ServerBackend) (relational rows plus hosted
//! objects) and [`LocalBackend`](crate::LocalBackend) (device database).
//! [`ShareBackend`] adds public sharing and is only available on the server.

use async_trait::async_trait;
use chrono::NaiveDate;
use unmark_shared::validation::ImageKind;
use unmark_shared::{EntryId, HistoryEntry, Identity, QuotaRecord, ResultReference, ShareSlug};

use crate::error::Result;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Register `identity` if unseen and return its current quota.
    async fn open_session(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord>;

    /// Current quota with the lazy reset applied.
    ///
    /// Fails with `NotFound` when the backend tracks identities and has never
    /// seen this one.
    async fn read_quota(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord>;

    /// Count one use for `today`.
    async fn increment(&self, identity: &Identity, today: NaiveDate) -> Result<QuotaRecord>;

    /// Make the produced image durable and return how to reach it.
    async fn store_result(
        &self,
        id: EntryId,
        kind: ImageKind,
        bytes: Vec<u8>,
    ) -> Result<ResultReference>;

    async fn append(&self, entry: &HistoryEntry) -> Result<EntryId>;

    /// Entries of `identity`, newest first.
    async fn list_by_identity(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<HistoryEntry>>;

    async fn get(&self, id: EntryId) -> Result<HistoryEntry>;
}

#[async_trait]
pub trait ShareBackend: Backend {
    /// Attach `slug` to a private entry. Returns `false` if it was already public.
    async fn mark_public(&self, id: EntryId, slug: &ShareSlug) -> Result<bool>;

    /// Public entries of all identities, newest first.
    async fn public_feed(&self, limit: u32) -> Result<Vec<HistoryEntry>>;

    async fn get_by_slug(&self, slug: &str) -> Result<HistoryEntry>;
}
