//! Device-only mode: the same pipeline as the server, backed by the local
//! database. Results are kept as payloads and leave the device only through
//! [`LocalClient::export`].

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use unmark_core::{HistoryReader, Processed, Processor, Transformer};
use unmark_shared::validation::validate_upload;
use unmark_shared::{Clock, EntryId, HistoryEntry, Identity, UnmarkError};
use unmark_store::{Database, LocalBackend};

use crate::error::Result;

pub struct LocalClient {
    processor: Processor<LocalBackend>,
    reader: HistoryReader<LocalBackend>,
    identity: Identity,
}

impl LocalClient {
    pub fn new(db: Database, transformer: Arc<dyn Transformer>, clock: Arc<dyn Clock>) -> Self {
        let backend = Arc::new(LocalBackend::new(db));
        Self {
            processor: Processor::new(backend.clone(), transformer, clock.clone()),
            reader: HistoryReader::new(backend, clock),
            identity: Identity::local(),
        }
    }

    /// Read, validate and process the image at `path`.
    pub async fn process_file(&self, path: &Path) -> Result<Processed> {
        let bytes = tokio::fs::read(path).await?;
        let source_reference = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.process(bytes, &source_reference).await
    }

    pub async fn process(&self, bytes: Vec<u8>, source_reference: &str) -> Result<Processed> {
        let upload = validate_upload(bytes)?;
        Ok(self
            .processor
            .process(&self.identity, &upload, source_reference)
            .await?)
    }

    pub async fn history(&self, limit: u32, offset: u32) -> Result<Vec<HistoryEntry>> {
        Ok(self.reader.list(&self.identity, limit, offset).await?)
    }

    pub async fn remaining_today(&self) -> Result<u32> {
        Ok(self.reader.remaining_today(&self.identity).await?)
    }

    /// Write the stored result of `id` to `dest`.
    pub async fn export(&self, id: EntryId, dest: &Path) -> Result<usize> {
        let entry = self.reader.get(id).await?;
        let payload = entry
            .result
            .payload()
            .ok_or_else(|| UnmarkError::Store("entry has no stored payload".to_string()))?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, payload).await?;

        info!(entry_id = %id, path = %dest.display(), size = payload.len(), "Exported result");
        Ok(payload.len())
    }
}
