//! # diskstore core
//!
//! A persistent key-value mapping on an embedded SQLite database, safe to
//! share between threads and forked processes.
//!
//! This crate provides:
//! - Value schemas derived from a [`Record`] description
//! - One connection per (process, thread), replaced after `fork`
//! - Precompiled statements per table
//! - Thread-reentrant transactions with optional busy retry
//! - [`DiskRead`], a read-only mapping with lazy paged iteration
//! - [`DiskStore`], the read-write mapping with additive schema migration
//!
//! ## Usage
//!
//! ```no_run
//! use diskstore_core::{impl_record, DiskStore, StoreResult};
//!
//! #[derive(Debug, PartialEq)]
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//!
//! impl_record!(Point { x: i64, y: i64 });
//!
//! fn main() -> StoreResult<()> {
//!     let store: DiskStore<Point> = DiskStore::open("points.db")?;
//!     store.set("origin", &Point { x: 0, y: 0 })?;
//!     assert_eq!(store.get("origin")?, Point { x: 0, y: 0 });
//!     for key in store.keys() {
//!         println!("{}", key?);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod pragma;
mod read;
pub mod record;
mod schema;
mod statements;
mod store;
mod transaction;

pub use config::{
    KeyType, StoreConfig, DEFAULT_FETCH_SIZE, DEFAULT_TIMEOUT, KEY_COLUMN, RETRY_INTERVAL,
};
pub use connection::{Location, OpenMode};
pub use diskstore_codec::{CodecError, FieldValue, StorageType, Value};
pub use error::{StoreError, StoreResult};
pub use pragma::{AutoVacuum, JournalMode, Pragmas, Synchronous, TempStore};
pub use read::{DiskRead, Items, Keys, RowIter, Values};
pub use record::{Record, Scalar};
pub use schema::{quote_ident, DerivedSchema, FieldDef, ValueSchema};
pub use statements::{Statement, Statements};
pub use store::DiskStore;
pub use transaction::Transaction;
