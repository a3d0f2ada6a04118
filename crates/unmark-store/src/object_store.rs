//! Filesystem object store for hosted results.
//!
//! Objects are named `<uuid>.<ext>` and addressed publicly as
//! `{public_base_url}/objects/<key>`. Keys are validated before they touch
//! the filesystem.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use unmark_shared::validation::ImageKind;
use uuid::Uuid;

use crate::error::{Result, StoreError};

const EXTENSIONS: [&str; 3] = ["jpg", "png", "webp"];

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in target.strip_prefix(base).unwrap_or(target).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(StoreError::InvalidKey("path traversal".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(base) {
        return Err(StoreError::InvalidKey("path traversal".to_string()));
    }
    Ok(resolved)
}

/// Check that `key` has the shape `<uuid>.<ext>` with a known extension.
pub fn validate_key(key: &str) -> Result<()> {
    let (stem, ext) = key
        .rsplit_once('.')
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
    if Uuid::parse_str(stem).is_err() || !EXTENSIONS.contains(&ext) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Content type for a validated key.
pub fn content_type(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") => ImageKind::Jpeg.mime(),
        Some("png") => ImageKind::Png.mime(),
        Some("webp") => ImageKind::WebP.mime(),
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl ObjectStore {
    pub async fn new(base_path: PathBuf, public_base_url: &str) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "Object store initialized");

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Durable public URL of `key`.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/objects/{}", self.public_base_url, key)
    }

    /// Write `data` under `<id>.<ext>` and return the key.
    pub async fn put(&self, id: Uuid, kind: ImageKind, data: &[u8]) -> Result<String> {
        let key = format!("{}.{}", id, kind.extension());
        let path = self.object_path(&key)?;

        // Write-then-rename so a reader never sees a partial object.
        let tmp = path.with_extension("part");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;

        debug!(key = %key, size = data.len(), "Stored object");
        Ok(key)
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;

        match fs::read(&path).await {
            Ok(data) => {
                debug!(key = %key, size = data.len(), "Retrieved object");
                Ok(data)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        ensure_within(&self.base_path, &self.base_path.join(key))
    }
}
