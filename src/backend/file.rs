//! Journaled on-disk backend.
//!
//! On-disk layout for a store opened at `<name>`:
//!
//! - `<name>` - the full document map, serialized as JSON
//! - `<name>.md5sum` - hex digest of the data file
//! - `<name>.journal` - append-only journal of operations not yet in the
//!   data file; its absence means the store was cleanly flushed
//!
//! Design principles, in order: durability over throughput, explicit failure
//! over silent recovery. A checksum mismatch anywhere halts immediately.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::checksum;
use super::errors::{StoreError, StoreResult};
use super::journal::{JournalAction, JournalRecord};
use super::store::RawStore;
use crate::Document;

/// A [`RawStore`] backed by a single data file, a checksum sidecar, and an
/// append-only journal for crash recovery.
///
/// The full document map lives in memory; every mutation is journaled
/// immediately and the data file is rewritten atomically on [`sync`].
///
/// [`sync`]: RawStore::sync
#[derive(Debug)]
pub struct JournaledFileStore {
    path: PathBuf,
    documents: BTreeMap<String, Document>,
    /// Hex digest of the data file as last committed to disk.
    committed: Option<String>,
    /// Journal records not yet appended to the journal file.
    queue: Vec<JournalRecord>,
    dirty: bool,
    closed: bool,
}

impl JournaledFileStore {
    /// Opens the store at `path`, creating an empty one if no data file
    /// exists.
    ///
    /// If a checksum sidecar is present, the data file must hash to it;
    /// a mismatch is a fatal [`StoreError::Integrity`]. If a journal file is
    /// present, recovery replays it before any request is served.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let mut documents = BTreeMap::new();
        let mut committed = None;

        match fs::read(&path) {
            Ok(bytes) => {
                let digest = checksum::hex_digest(&bytes);
                match fs::read_to_string(sibling(&path, ".md5sum")) {
                    Ok(expected) => {
                        if expected.trim() != digest {
                            return Err(StoreError::Integrity(format!(
                                "data file {} does not match its checksum sidecar",
                                path.display()
                            )));
                        }
                    }
                    // No sidecar: adopt the recomputed digest as current.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                if !bytes.is_empty() {
                    documents = serde_json::from_slice(&bytes)?;
                }
                committed = Some(digest);
            }
            // Missing data file means "start empty", never an error.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut store = Self {
            path,
            documents,
            committed,
            queue: Vec::new(),
            dirty: false,
            closed: false,
        };
        store.recover()?;
        Ok(store)
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of documents currently held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true when no documents are held.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn guard(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn journal_path(&self) -> PathBuf {
        sibling(&self.path, ".journal")
    }

    fn sidecar_path(&self) -> PathBuf {
        sibling(&self.path, ".md5sum")
    }

    /// Replays the journal, if one exists, into the in-memory map.
    ///
    /// Records apply in file order so later records override earlier ones
    /// for the same key. Any checksum mismatch aborts recovery: corrupt tail
    /// records are never silently dropped.
    fn recover(&mut self) -> StoreResult<()> {
        let file = match File::open(self.journal_path()) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut replayed = 0usize;
        while let Some(record) = JournalRecord::read_from(&mut reader)? {
            match record.action {
                JournalAction::Set => {
                    self.documents
                        .insert(record.key, record.value.unwrap_or_default());
                }
                JournalAction::Del => {
                    self.documents.remove(&record.key);
                }
            }
            replayed += 1;
        }

        info!(records = replayed, path = %self.path.display(), "journal recovery complete");
        // The journal held state the data file does not; the next flush
        // rewrites the data file and retires the journal.
        self.dirty = true;
        Ok(())
    }

    /// Appends every queued record to the journal file and clears the queue.
    fn flush_journal(&mut self) -> StoreResult<()> {
        if self.queue.is_empty() {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path())?;
        for record in self.queue.drain(..) {
            file.write_all(&record.encode()?)?;
        }
        file.sync_all()?;
        Ok(())
    }

    fn remove_journal(&self) -> StoreResult<()> {
        match fs::remove_file(self.journal_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl RawStore for JournaledFileStore {
    fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        self.guard()?;
        Ok(self.documents.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Document) -> StoreResult<()> {
        self.guard()?;
        self.documents.insert(key.to_string(), value.clone());
        self.queue.push(JournalRecord::set(key, value));
        self.dirty = true;
        self.flush_journal()
    }

    fn delete(&mut self, key: &str) -> StoreResult<()> {
        self.guard()?;
        if self.documents.remove(key).is_some() {
            self.queue.push(JournalRecord::del(key));
            self.dirty = true;
            self.flush_journal()?;
        }
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.guard()?;
        Ok(self.documents.keys().cloned().collect())
    }

    /// Flushes the in-memory map to disk.
    ///
    /// The full map is serialized and hashed; if the digest matches the
    /// committed one the rewrite is skipped entirely, but the journal is
    /// still retired. Otherwise the new blob lands in a temp file, the
    /// sidecar is updated, and the temp file replaces the original
    /// (remove-then-rename; a missing original is not an error).
    fn sync(&mut self) -> StoreResult<()> {
        self.guard()?;
        if !self.dirty {
            return Ok(());
        }

        let blob = serde_json::to_vec(&self.documents)?;
        let digest = checksum::hex_digest(&blob);

        if self.committed.as_deref() == Some(digest.as_str()) {
            debug!(path = %self.path.display(), "data file unchanged, skipping rewrite");
            self.remove_journal()?;
            self.dirty = false;
            return Ok(());
        }

        let tmp = sibling(&self.path, "_new");
        fs::write(&tmp, &blob)?;
        fs::write(self.sidecar_path(), &digest)?;

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            // Original already gone: nothing to worry about, rename proceeds.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&tmp, &self.path)?;

        // Everything in the journal is now in the data file.
        self.remove_journal()?;
        debug!(path = %self.path.display(), bytes = blob.len(), "data file flushed");

        self.committed = Some(digest);
        self.dirty = false;
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.sync()?;
        self.closed = true;
        self.documents.clear();
        Ok(())
    }
}

/// Builds `<path><suffix>` without touching the extension, so `db.journal`
/// sits next to `db` even when the name itself contains dots.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_path(dir: &TempDir) -> PathBuf {
        dir.path().join("test_db")
    }

    #[test]
    fn open_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = JournaledFileStore::open(store_path(&dir)).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn set_then_sync_writes_data_file_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let mut store = JournaledFileStore::open(&path).unwrap();
        store.set("t.row", json!({"a": 1})).unwrap();
        assert!(sibling(&path, ".journal").exists());

        store.sync().unwrap();
        assert!(path.exists());
        assert!(sibling(&path, ".md5sum").exists());
        // Journal is redundant after a successful flush.
        assert!(!sibling(&path, ".journal").exists());
    }

    #[test]
    fn reopen_after_clean_close_restores_documents() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let mut store = JournaledFileStore::open(&path).unwrap();
            store.set("t.row", json!({"a": 1})).unwrap();
            store.close().unwrap();
        }

        let store = JournaledFileStore::open(&path).unwrap();
        assert_eq!(store.get("t.row").unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn journal_recovery_replays_unflushed_writes() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        // Simulated crash: mutate, never sync, drop the store.
        {
            let mut store = JournaledFileStore::open(&path).unwrap();
            store.set("t.a", json!({"n": 1})).unwrap();
            store.set("t.b", json!({"n": 2})).unwrap();
            store.delete("t.a").unwrap();
        }
        assert!(!path.exists());
        assert!(sibling(&path, ".journal").exists());

        let store = JournaledFileStore::open(&path).unwrap();
        assert_eq!(store.get("t.a").unwrap(), None);
        assert_eq!(store.get("t.b").unwrap(), Some(json!({"n": 2})));
    }

    #[test]
    fn later_journal_records_override_earlier_ones() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let mut store = JournaledFileStore::open(&path).unwrap();
            store.set("t.row", json!({"v": "old"})).unwrap();
            store.set("t.row", json!({"v": "new"})).unwrap();
        }

        let store = JournaledFileStore::open(&path).unwrap();
        assert_eq!(store.get("t.row").unwrap(), Some(json!({"v": "new"})));
    }

    #[test]
    fn corrupt_journal_record_halts_recovery() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let mut store = JournaledFileStore::open(&path).unwrap();
            store.set("t.row", json!({"a": 1})).unwrap();
        }

        let journal = sibling(&path, ".journal");
        let mut bytes = fs::read(&journal).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&journal, bytes).unwrap();

        let err = JournaledFileStore::open(&path).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn corrupt_data_file_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let mut store = JournaledFileStore::open(&path).unwrap();
            store.set("t.row", json!({"a": 1})).unwrap();
            store.close().unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let err = JournaledFileStore::open(&path).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn sync_skips_rewrite_when_contents_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let mut store = JournaledFileStore::open(&path).unwrap();
        store.set("t.row", json!({"a": 1})).unwrap();
        store.sync().unwrap();
        let first_mtime = fs::metadata(&path).unwrap().modified().unwrap();

        // Write the same value again: the digest is unchanged, so the data
        // file is left alone but the journal is still retired.
        store.set("t.row", json!({"a": 1})).unwrap();
        assert!(sibling(&path, ".journal").exists());
        store.sync().unwrap();
        assert!(!sibling(&path, ".journal").exists());
        assert_eq!(
            fs::metadata(&path).unwrap().modified().unwrap(),
            first_mtime
        );
    }

    #[test]
    fn access_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = JournaledFileStore::open(store_path(&dir)).unwrap();
        store.close().unwrap();

        assert!(matches!(store.get("t.row"), Err(StoreError::Closed)));
        assert!(matches!(
            store.set("t.row", json!({})),
            Err(StoreError::Closed)
        ));
        assert!(store.close().is_ok());
    }
}
