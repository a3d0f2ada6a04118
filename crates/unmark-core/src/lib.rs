//! # unmark-core
//!
//! The quota-gated processing pipeline and the read/share paths on top of the
//! storage contract from `unmark-store`:
//!
//! - [`Processor`] checks quota, calls the remote [`Transformer`], persists
//!   the result and counts the use
//! - [`HistoryReader`] serves history, quota and the public feed
//! - [`SharePublisher`] promotes an entry to a public short link

pub mod processor;
pub mod publisher;
pub mod reader;
pub mod replicate;
pub mod transform;

use unmark_shared::UnmarkError;
use unmark_store::StoreError;

pub use processor::{Processed, Processor};
pub use publisher::{Published, SharePublisher};
pub use reader::{HistoryReader, HistorySnapshot};
pub use replicate::{ReplicateConfig, ReplicateTransformer};
pub use transform::{TransformError, Transformer};

/// Map a read-path store failure to the user-facing taxonomy.
pub(crate) fn read_error(e: StoreError) -> UnmarkError {
    match e {
        StoreError::NotFound => UnmarkError::NotFound,
        other => UnmarkError::Store(other.to_string()),
    }
}
