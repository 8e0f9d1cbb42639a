//! Raw storage backends.
//!
//! A backend is a flat, byte-oriented key space of documents behind the
//! [`RawStore`] contract. Two implementations ship with the crate:
//!
//! - [`MemoryStore`] - volatile, for scratch databases and tests
//! - [`JournaledFileStore`] - a single data file with a checksum sidecar and
//!   an append-only journal for crash recovery
//!
//! # Invariants
//!
//! - Data file and sidecar, when both present, must match; mismatch is fatal
//! - The journal contains only operations not yet in the data file
//! - Journal replay is idempotent and aborts on any checksum mismatch
//! - Access after `close()` fails rather than returning stale data

pub mod checksum;
mod errors;
mod file;
mod journal;
mod store;

pub use errors::{StoreError, StoreResult};
pub use file::JournaledFileStore;
pub use journal::{JournalAction, JournalRecord};
pub use store::{MemoryStore, RawStore};
