//! Tables: namespaced rows, field addressing, secondary indexes.
//!
//! # Design principles
//!
//! - A table is a cheap handle; all state lives in the database
//! - Index maintenance is incremental on write and atomic on rebuild
//! - A damaged index degrades queries to a table scan, never to wrong
//!   results

mod field;
mod index;
#[allow(clippy::module_inception)]
mod table;

pub use field::Field;
pub use index::{bucket_key, INDEX_SUFFIX};
pub use table::Table;

pub(crate) use index::{bucket_count, buckets, canonical_number, is_stale};
