//! Query layer: predicates, type filters, composable result sets.
//!
//! # Design principles
//!
//! - A query resolves to keys eagerly and to rows lazily
//! - The index fast path and the row scan must agree on every result
//! - Predicates never fail on type mismatch, they just do not match

pub mod predicates;
#[allow(clippy::module_inception)]
mod query;

pub use predicates::PredicateFn;
pub use query::{Query, QueryParams, ValueType};
