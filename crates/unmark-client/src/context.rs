//! Per-run client context for the server-backed mode.
//!
//! Holds the identity and a cache of the newest history entries so call
//! sites do not reach for globals. The identity is loaded on first use and
//! persisted by the provider. The cache is filled by [`ClientContext::session`]
//! and dropped whenever a write (process, share) succeeds.

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::info;

use unmark_shared::protocol::{EntryView, ProcessData, SessionData, ShareData};
use unmark_shared::validation::validate_upload;
use unmark_shared::{EntryId, Identity, UnmarkError};

use crate::api_client::ApiClient;
use crate::error::{ClientError, Result};
use crate::identity::FileIdentityProvider;

pub struct ClientContext {
    api: ApiClient,
    provider: FileIdentityProvider,
    identity: Option<Identity>,
    history: Option<Vec<EntryView>>,
    remaining_today: Option<u32>,
}

impl ClientContext {
    pub fn new(api: ApiClient, provider: FileIdentityProvider) -> Self {
        Self {
            api,
            provider,
            identity: None,
            history: None,
            remaining_today: None,
        }
    }

    pub fn identity(&mut self) -> &Identity {
        self.identity
            .get_or_insert_with(|| self.provider.get_or_create())
    }

    /// Last known remaining quota, if the server has told us.
    pub fn remaining_today(&self) -> Option<u32> {
        self.remaining_today
    }

    /// Register (if needed) and load quota plus the newest entries.
    pub async fn session(&mut self) -> Result<SessionData> {
        let identity = self.identity().clone();
        let data = self.api.session(&identity).await?;
        self.remaining_today = Some(data.remaining_today);
        self.history = Some(data.history.clone());
        Ok(data)
    }

    /// Validate `bytes` locally, then send them for processing.
    ///
    /// If the server has no record of the identity, the session is opened
    /// and the call is retried once.
    pub async fn process(&mut self, bytes: Vec<u8>, source_reference: &str) -> Result<ProcessData> {
        let upload = validate_upload(bytes)?;
        let encoded = STANDARD.encode(&upload.bytes);
        let identity = self.identity().clone();
        let source = Some(source_reference.to_string());

        let data = match self.api.process(&identity, encoded.clone(), source.clone()).await {
            Err(ClientError::Unmark(UnmarkError::IdentityNotFound)) => {
                info!(identity = %identity.short(), "Identity unknown to server, re-registering");
                self.session().await?;
                self.api.process(&identity, encoded, source).await?
            }
            other => other?,
        };

        self.remaining_today = Some(data.remaining_today);
        self.history = None;
        Ok(data)
    }

    /// Newest entries, served from the cache when it is warm.
    pub async fn recent(&mut self) -> Result<Vec<EntryView>> {
        if let Some(history) = &self.history {
            return Ok(history.clone());
        }
        Ok(self.session().await?.history)
    }

    /// A page of history straight from the server.
    pub async fn history(&mut self, limit: u32, offset: u32) -> Result<Vec<EntryView>> {
        let identity = self.identity().clone();
        self.api.history(&identity, limit, offset).await
    }

    pub async fn share(&mut self, entry_id: EntryId) -> Result<ShareData> {
        let identity = self.identity().clone();
        let data = self.api.share(&identity, entry_id).await?;
        self.history = None;
        Ok(data)
    }

    pub async fn public_feed(&self) -> Result<Vec<EntryView>> {
        self.api.public_feed().await
    }

    pub fn has_cached_history(&self) -> bool {
        self.history.is_some()
    }
}
