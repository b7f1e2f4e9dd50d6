//! repartitioner-table: the materialized keyed table.
//!
//! Backed by [redb](https://docs.rs/redb). Every upsert writes the current
//! value into the `entries` table and appends a record to the `changelog`
//! table inside the same write transaction, so the changelog always covers
//! the entries and can rebuild them after a restart.
//!
//! `KeyedTable` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`) and
//! is shared by every stream worker thread.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{TableError, TableResult};
pub use store::KeyedTable;
pub use types::*;
