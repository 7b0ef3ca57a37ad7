//! SQLite backend for the Roster record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The database plays the part of the
//! backing collection: it owns the username unique index and every tag-set
//! mutation happens inside it.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_COLLECTION, SqliteStore, StoreOptions};
