//! # unmark-client
//!
//! Command-line client for Unmark. Runs the processing pipeline against the
//! device database (local mode) or talks to an Unmark server (remote mode).

pub mod api_client;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod local;

use tracing_subscriber::{fmt, EnvFilter};

pub use api_client::ApiClient;
pub use config::ClientConfig;
pub use context::ClientContext;
pub use error::{ClientError, Result};
pub use identity::FileIdentityProvider;
pub use local::LocalClient;

/// Log to stderr so command output on stdout stays clean.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,unmark_client=info,unmark_core=info,unmark_store=warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
