//! Persistence of the anonymous identity token.
//!
//! The token is created on first use and written to a file in the data
//! directory; later runs reuse it so quota and history follow the device.

use std::path::PathBuf;

use tracing::{debug, info, warn};
use unmark_shared::Identity;

pub struct FileIdentityProvider {
    path: PathBuf,
}

impl FileIdentityProvider {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the stored identity, minting and persisting a new one if there
    /// is none. A token that cannot be persisted is still returned; it only
    /// lives for this run.
    pub fn get_or_create(&self) -> Identity {
        if let Some(identity) = self.load() {
            return identity;
        }

        let identity = Identity::generate();
        match self.save(&identity) {
            Ok(()) => info!(identity = %identity.short(), "Created identity"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Could not persist identity, using a temporary one"
            ),
        }
        identity
    }

    fn load(&self) -> Option<Identity> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let identity = Identity::parse(&raw);
        if identity.is_none() {
            debug!(path = %self.path.display(), "Ignoring unreadable identity file");
        }
        identity
    }

    fn save(&self, identity: &Identity) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, identity.as_str())
    }
}
