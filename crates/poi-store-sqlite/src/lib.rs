//! SQLite backend for the POI catalogue.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every multi-statement write runs in a
//! single transaction.

mod encode;
mod hierarchy;
mod reconcile;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use hierarchy::DEFAULT_MAX_DEPTH;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
