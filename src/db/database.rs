//! The database: pending write-back cache, lock policy, and table registry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use serde_json::json;

use super::options::{DatabaseOptions, LockMode};
use crate::backend::{JournaledFileStore, MemoryStore, RawStore};
use crate::entry::Defaults;
use crate::errors::DbResult;
use crate::table::{is_stale, Field, Table, INDEX_SUFFIX};
use crate::Document;

/// Keys frozen at the start of a bulk batch so enumeration does not race
/// with mutation from the same batch.
#[derive(Debug, Clone)]
pub(crate) struct FrozenKeySnapshot {
    keys: Vec<String>,
}

/// Per-index bookkeeping held in memory alongside the persisted buckets.
#[derive(Debug, Clone)]
pub(crate) struct IndexState {
    pub(crate) field: Field,
    /// Set when incremental maintenance hit a missing bucket; cleared by a
    /// full refresh. A stale index is skipped by the query fast path.
    pub(crate) stale: bool,
}

/// In-memory state for one table, created lazily and cached for the
/// database's lifetime.
#[derive(Debug, Clone, Default)]
pub(crate) struct TableState {
    /// Normalized field key -> index bookkeeping
    pub(crate) indexes: BTreeMap<String, IndexState>,
    /// Default-value table attached to entries read from this table
    pub(crate) defaults: Option<Defaults>,
}

/// Everything guarded by the process-wide lock.
pub(crate) struct DatabaseState {
    pub(crate) backend: Box<dyn RawStore>,
    /// Write-back cache; a hit here wins over the backend.
    pub(crate) pending: BTreeMap<String, Document>,
    pub(crate) tables: HashMap<String, TableState>,
    pub(crate) lock_mode: LockMode,
    pub(crate) bulk_snapshot: Option<FrozenKeySnapshot>,
}

impl DatabaseState {
    /// Pending-cache hit wins; a missing key reads as an empty document,
    /// never an error.
    pub(crate) fn raw_get(&self, key: &str) -> DbResult<Document> {
        if let Some(doc) = self.pending.get(key) {
            return Ok(doc.clone());
        }
        Ok(self.backend.get(key)?.unwrap_or_else(|| json!({})))
    }

    pub(crate) fn raw_write(&mut self, key: &str, value: Document) {
        self.pending.insert(key.to_string(), value);
    }

    pub(crate) fn raw_delete(&mut self, key: &str) -> DbResult<()> {
        self.pending.remove(key);
        self.backend.delete(key)?;
        Ok(())
    }

    /// Union of backend and pending keys, sorted and deduplicated.
    fn live_composite_keys(&self) -> DbResult<Vec<String>> {
        let mut keys: BTreeSet<String> = self.backend.keys()?.into_iter().collect();
        keys.extend(self.pending.keys().cloned());
        Ok(keys.into_iter().collect())
    }

    /// Composite keys as seen by enumeration; frozen during bulk mode.
    pub(crate) fn composite_keys(&self) -> DbResult<Vec<String>> {
        if let Some(snapshot) = &self.bulk_snapshot {
            return Ok(snapshot.keys.clone());
        }
        self.live_composite_keys()
    }

    /// Merges every pending entry into the backend. The backend journals
    /// each write durably; the data file itself is only rewritten by
    /// [`flush`](DatabaseState::flush).
    pub(crate) fn merge_pending(&mut self) -> DbResult<()> {
        while let Some((key, value)) = self.pending.pop_first() {
            self.backend.set(&key, value)?;
        }
        Ok(())
    }

    /// Merges every pending entry into the backend and syncs it.
    pub(crate) fn flush(&mut self) -> DbResult<()> {
        self.merge_pending()?;
        self.backend.sync()?;
        Ok(())
    }
}

/// An embedded, table-namespaced document database.
///
/// All reads and writes go through `raw_get`/`raw_write`/`raw_delete`, which
/// provide write-back batching behind a single process-wide lock. Tables are
/// handles over the flat key space; see [`Table`].
pub struct Database {
    state: Mutex<DatabaseState>,
    options: DatabaseOptions,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a database over a journaled file store at `path`.
    pub fn open(path: impl AsRef<Path>, options: DatabaseOptions) -> DbResult<Self> {
        let backend = JournaledFileStore::open(path.as_ref())?;
        Ok(Self::with_backend(Box::new(backend), options))
    }

    /// Creates a database over an arbitrary backend.
    pub fn with_backend(backend: Box<dyn RawStore>, options: DatabaseOptions) -> Self {
        Self {
            state: Mutex::new(DatabaseState {
                backend,
                pending: BTreeMap::new(),
                tables: HashMap::new(),
                lock_mode: LockMode::PerCall,
                bulk_snapshot: None,
            }),
            options,
        }
    }

    /// Creates a volatile in-memory database.
    pub fn in_memory(options: DatabaseOptions) -> Self {
        Self::with_backend(Box::new(MemoryStore::new()), options)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, DatabaseState> {
        self.state.lock()
    }

    pub(crate) fn options(&self) -> DatabaseOptions {
        self.options
    }

    /// Flush policy applied after a single write: outside write-back and
    /// bulk modes, the write merges into the backend before returning, where
    /// the journal makes it durable. The data file rewrite waits for an
    /// explicit [`sync`](Database::sync) or [`close`](Database::close).
    pub(crate) fn flush_after_write(&self, state: &mut DatabaseState) -> DbResult<()> {
        if state.lock_mode == LockMode::PerCall && !self.options.write_back {
            state.merge_pending()?;
        }
        Ok(())
    }

    /// Returns a handle to the named table, creating its in-memory state on
    /// first access. Indexes persisted in the table's `__index` meta-table
    /// are re-discovered here, staleness markers included.
    pub fn table(&self, name: &str) -> DbResult<Table<'_>> {
        let mut state = self.state();
        if !state.tables.contains_key(name) {
            let prefix = format!("{name}{INDEX_SUFFIX}.");
            let mut indexes = BTreeMap::new();
            for key in state.composite_keys()? {
                if let Some(field_key) = key.strip_prefix(&prefix) {
                    let stale = is_stale(&state.raw_get(&key)?);
                    indexes.insert(
                        field_key.to_string(),
                        IndexState {
                            field: Field::from_key(field_key),
                            stale,
                        },
                    );
                }
            }
            state.tables.insert(
                name.to_string(),
                TableState {
                    indexes,
                    defaults: None,
                },
            );
        }
        Ok(Table::new(self, name))
    }

    /// Returns the set of table names present in the backend or the pending
    /// cache, excluding index meta-tables.
    pub fn keys(&self) -> DbResult<Vec<String>> {
        let state = self.state();
        let mut names = BTreeSet::new();
        for key in state.composite_keys()? {
            let table = key.split('.').next().unwrap_or(&key);
            if !table.ends_with(INDEX_SUFFIX) {
                names.insert(table.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Reads one composite key. Missing keys read as empty documents.
    pub fn raw_get(&self, key: &str) -> DbResult<Document> {
        self.state().raw_get(key)
    }

    /// Writes one composite key through the pending cache.
    pub fn raw_write(&self, key: &str, value: Document) -> DbResult<()> {
        let mut state = self.state();
        state.raw_write(key, value);
        self.flush_after_write(&mut state)
    }

    /// Deletes one composite key from the cache and the backend.
    /// Deleting a nonexistent key is a no-op.
    pub fn raw_delete(&self, key: &str) -> DbResult<()> {
        let mut state = self.state();
        state.raw_delete(key)?;
        self.flush_after_write(&mut state)
    }

    /// Merges all pending writes into the backend and syncs it.
    pub fn sync(&self) -> DbResult<()> {
        self.state().flush()
    }

    /// Enters bulk mode: per-write flushing is deferred and key enumeration
    /// is frozen at the current key set until [`release_bulk_lock`].
    ///
    /// [`release_bulk_lock`]: Database::release_bulk_lock
    pub fn bulk_lock(&self) -> DbResult<()> {
        let mut state = self.state();
        let keys = state.live_composite_keys()?;
        state.lock_mode = LockMode::CallerHeld;
        state.bulk_snapshot = Some(FrozenKeySnapshot { keys });
        Ok(())
    }

    /// Leaves bulk mode and flushes the whole batch, making it visible.
    pub fn release_bulk_lock(&self) -> DbResult<()> {
        let mut state = self.state();
        state.lock_mode = LockMode::PerCall;
        state.bulk_snapshot = None;
        state.flush()
    }

    /// Copies every key from the live store into `target`, removes target
    /// keys absent from the source snapshot, then flushes and closes the
    /// target. Handles targets that pre-existed with stale data.
    pub fn backup(&self, target: &mut dyn RawStore) -> DbResult<()> {
        let mut state = self.state();
        state.flush()?;

        let source_keys: BTreeSet<String> = state.backend.keys()?.into_iter().collect();
        for key in &source_keys {
            if let Some(value) = state.backend.get(key)? {
                target.set(key, value)?;
            }
        }
        for key in target.keys()? {
            if !source_keys.contains(&key) {
                target.delete(&key)?;
            }
        }
        target.sync()?;
        target.close()?;
        Ok(())
    }

    /// Backs up into a fresh journaled file store at `path`.
    pub fn backup_to_path(&self, path: impl AsRef<Path>) -> DbResult<()> {
        let mut target = JournaledFileStore::open(path.as_ref())?;
        self.backup(&mut target)
    }

    /// Flushes pending writes and closes the backend. Further access fails
    /// with a closed-store error.
    pub fn close(&self) -> DbResult<()> {
        let mut state = self.state();
        state.flush()?;
        state.backend.close()?;
        Ok(())
    }

    /// Number of writes staged in the pending cache.
    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }
}
