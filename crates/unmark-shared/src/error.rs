use thiserror::Error;

/// User-facing failure classes.
///
/// Every externally visible failure collapses to one of these; the HTTP layer
/// turns each into a status code and a flat message.
#[derive(Error, Debug)]
pub enum UnmarkError {
    /// Bad input. Rejected before any side effect.
    #[error("{0}")]
    Validation(String),

    /// Daily limit reached. Rejected before the remote call.
    #[error("Daily limit reached. You can process {limit} images per day, try again tomorrow.")]
    QuotaExceeded { limit: u32 },

    /// The server has never seen this identity.
    #[error("Session not found, please reload")]
    IdentityNotFound,

    /// The remote transformation failed, timed out or returned nothing usable.
    #[error("Failed to process image: {0}")]
    Upstream(String),

    /// A write failed after a successful transformation.
    #[error("Failed to save processed image: {0}")]
    Persistence(String),

    /// Unknown entry, or an entry owned by someone else.
    #[error("Image not found")]
    NotFound,

    /// A read against the store failed.
    #[error("Storage error: {0}")]
    Store(String),

    /// The configured backend cannot do this (sharing in local mode).
    #[error("Not available in local mode")]
    Unsupported,
}

impl UnmarkError {
    /// Short machine-readable class name, used as a log field.
    pub fn class(&self) -> &'static str {
        match self {
            UnmarkError::Validation(_) => "validation",
            UnmarkError::QuotaExceeded { .. } => "quota_exceeded",
            UnmarkError::IdentityNotFound => "identity_not_found",
            UnmarkError::Upstream(_) => "upstream",
            UnmarkError::Persistence(_) => "persistence",
            UnmarkError::NotFound => "not_found",
            UnmarkError::Store(_) => "store",
            UnmarkError::Unsupported => "unsupported",
        }
    }
}
