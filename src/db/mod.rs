//! Database layer: pending write-back cache, lock policy, table registry.
//!
//! # Design principles
//!
//! - All reads and writes flow through the raw operations so batching and
//!   locking live in exactly one place
//! - Missing data is not an error: absent keys read as empty documents
//! - Bulk mode trades per-operation flushing for a caller-held critical
//!   section and a frozen key snapshot

mod database;
mod options;

pub use database::Database;
pub use options::{DatabaseOptions, LockMode};

pub(crate) use database::{DatabaseState, IndexState};
