//! Promotion of a private history entry to a public short link.

use std::sync::Arc;

use tracing::info;
use unmark_shared::{EntryId, Identity, ShareSlug, UnmarkError};
use unmark_store::ShareBackend;

use crate::read_error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub share_url: String,
    pub share_slug: ShareSlug,
}

pub struct SharePublisher<B: ?Sized> {
    backend: Arc<B>,
    site_url: String,
}

impl<B: ?Sized> Clone for SharePublisher<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            site_url: self.site_url.clone(),
        }
    }
}

impl<B: ShareBackend + ?Sized> SharePublisher<B> {
    pub fn new(backend: Arc<B>, site_url: &str) -> Self {
        Self {
            backend,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn share_url(&self, slug: &ShareSlug) -> String {
        format!("{}/s/{}", self.site_url, slug)
    }

    /// Make `id` public on behalf of `identity`.
    ///
    /// Entries of other identities are reported exactly like missing ones.
    /// Publishing twice returns the slug minted the first time.
    pub async fn publish(&self, id: EntryId, identity: &Identity) -> Result<Published, UnmarkError> {
        let entry = self.backend.get(id).await.map_err(read_error)?;
        if &entry.identity != identity {
            return Err(UnmarkError::NotFound);
        }

        if let Some(slug) = entry.share_slug {
            return Ok(self.published(slug));
        }

        let slug = ShareSlug::generate();
        let changed = self
            .backend
            .mark_public(id, &slug)
            .await
            .map_err(|e| UnmarkError::Store(e.to_string()))?;

        if !changed {
            // Lost a race with a concurrent publish; keep the winner's slug.
            let current = self.backend.get(id).await.map_err(read_error)?;
            let slug = current.share_slug.ok_or(UnmarkError::NotFound)?;
            return Ok(self.published(slug));
        }

        info!(entry_id = %id, slug = %slug, "Entry published");
        Ok(self.published(slug))
    }

    fn published(&self, slug: ShareSlug) -> Published {
        Published {
            share_url: self.share_url(&slug),
            share_slug: slug,
        }
    }
}
