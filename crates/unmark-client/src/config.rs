//! Client configuration loaded from environment variables and flags.

use std::path::PathBuf;

use directories::ProjectDirs;
use unmark_core::ReplicateConfig;
use unmark_shared::constants::DEFAULT_HTTP_PORT;

/// File name of the device database inside the data directory.
const DATABASE_FILE: &str = "unmark.db";

/// File name of the persisted identity token inside the data directory.
const IDENTITY_FILE: &str = "identity";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server used by `remote` commands.
    /// Env: `UNMARK_SERVER_URL`
    /// Default: `http://localhost:8080`
    pub server_url: String,

    /// Directory for the device database and the identity token.
    /// Env: `UNMARK_DATA_DIR`
    /// Default: the platform data directory (`ProjectDirs`)
    pub data_dir: PathBuf,

    /// Remote transform settings used in local mode (`REPLICATE_*`).
    pub replicate: ReplicateConfig,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let server_url = lookup("UNMARK_SERVER_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{DEFAULT_HTTP_PORT}"));

        let data_dir = lookup("UNMARK_DATA_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        Self {
            server_url,
            data_dir,
            replicate: ReplicateConfig::from_lookup(&lookup),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_FILE)
    }
}

fn default_data_dir() -> PathBuf {
    match ProjectDirs::from("app", "unmark", "unmark") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => {
            tracing::warn!("No platform data directory, using ./.unmark");
            PathBuf::from(".unmark")
        }
    }
}
