use thiserror::Error;
use unmark_shared::UnmarkError;
use unmark_store::StoreError;

/// Failures seen by the command-line client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A failure class the server (or the local pipeline) reported.
    #[error(transparent)]
    Unmark(#[from] UnmarkError),

    /// The server could not be reached or answered garbage.
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other non-success answer from the server.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
