//! Entries: structured views with defaults and computed joins.
//!
//! # Design principles
//!
//! - Every view into a row shares one document; paths, not nesting
//! - Plain defaults materialize into storage, joins never do
//! - Computed fields are read-only from the caller's side

mod defaults;
#[allow(clippy::module_inception)]
mod entry;

pub use defaults::{DefaultSpec, Defaults, Join};
pub use entry::{Entry, EntryValue};
