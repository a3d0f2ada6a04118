//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use unmark_core::ReplicateConfig;
use unmark_shared::constants::DEFAULT_HTTP_PORT;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database holding sessions and history.
    /// Env: `DATABASE_PATH`
    /// Default: `./data/unmark.db`
    pub database_path: PathBuf,

    /// Directory where processed images are hosted.
    /// Env: `OBJECT_STORAGE_PATH`
    /// Default: `./objects`
    pub object_storage_path: PathBuf,

    /// Public base URL, used for share links and hosted image URLs.
    /// Env: `SITE_URL`
    /// Default: `http://localhost:8080`
    pub site_url: String,

    /// Remote transform settings (`REPLICATE_*`).
    pub replicate: ReplicateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./data/unmark.db"),
            object_storage_path: PathBuf::from("./objects"),
            site_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            replicate: ReplicateConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("OBJECT_STORAGE_PATH").filter(|p| !p.is_empty()) {
            config.object_storage_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("SITE_URL") {
            match normalize_site_url(&url) {
                Some(url) => config.site_url = url,
                None => tracing::warn!(value = %url, "Invalid SITE_URL, using default"),
            }
        }

        config.replicate = ReplicateConfig::from_lookup(&lookup);

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Accept only absolute http(s) URLs; drop a trailing slash.
fn normalize_site_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))?;
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.site_url, "http://localhost:8080");
        assert!(config.replicate.api_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/var/lib/unmark/db.sqlite"),
            ("SITE_URL", "https://unmark.example/"),
            ("REPLICATE_API_TOKEN", "r8_token"),
        ]));
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/var/lib/unmark/db.sqlite"));
        assert_eq!(config.site_url, "https://unmark.example");
        assert_eq!(config.replicate.api_token.as_deref(), Some("r8_token"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("SITE_URL", "ftp://example"),
        ]));
        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.site_url, "http://localhost:8080");
    }
}
