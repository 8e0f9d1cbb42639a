//! shelfdb - an embedded, table-namespaced document store with secondary
//! indexes, a composable query layer, and crash-safe journaled persistence.
//!
//! Rows are JSON documents stored under `<table>.<rowKey>` composite keys in
//! a pluggable byte store. Layers, bottom up:
//!
//! - [`backend`] durable key-value storage with journaling and checksums
//! - [`db`] write-back cache, locking, backup
//! - [`table`] namespacing, field addressing, secondary indexes
//! - [`query`] predicates and composable result sets
//! - [`entry`] structured row views with defaults and computed joins

pub mod backend;
pub mod db;
pub mod entry;
pub mod errors;
pub mod query;
pub mod table;

pub use db::{Database, DatabaseOptions};
pub use entry::{Defaults, Entry, EntryValue, Join};
pub use errors::{DbError, DbResult};
pub use query::{predicates, Query, QueryParams, ValueType};
pub use table::{Field, Table};

/// A stored document. Rows in data tables are always JSON objects; nested
/// values may be any JSON type.
pub type Document = serde_json::Value;
