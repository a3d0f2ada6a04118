//! # unmark-store
//!
//! Persistence for Unmark, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle with typed CRUD helpers,
//! a filesystem [`ObjectStore`] for hosted results, and the async [`Backend`]
//! contract with its two implementations: [`ServerBackend`] for the
//! server-authoritative mode and [`LocalBackend`] for the device-only mode.

pub mod backend;
pub mod database;
pub mod images;
pub mod local;
pub mod local_backend;
pub mod migrations;
pub mod object_store;
pub mod server_backend;
pub mod sessions;

mod error;

pub use backend::{Backend, ShareBackend};
pub use database::Database;
pub use error::{Result, StoreError};
pub use local_backend::LocalBackend;
pub use object_store::ObjectStore;
pub use server_backend::ServerBackend;
