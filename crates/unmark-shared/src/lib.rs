//! # unmark-shared
//!
//! Types shared by every Unmark crate: the anonymous identity token, history
//! and quota records, the user-facing error taxonomy, upload validation, the
//! clock seam and the JSON wire protocol spoken between client and server.

pub mod clock;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;
pub mod validation;

pub use clock::{Clock, SystemClock};
pub use error::UnmarkError;
pub use types::{EntryId, HistoryEntry, Identity, QuotaRecord, ResultReference, ShareSlug};
