//! The pluggable byte-oriented store contract and the in-memory backend.

use std::collections::BTreeMap;

use super::errors::{StoreError, StoreResult};
use crate::Document;

/// Contract consumed by the database layer.
///
/// A raw store is a flat key space of documents. It knows nothing about
/// tables, indexes, or caching; namespacing happens above it. `sync` and
/// `close` are cheap no-ops for volatile backends.
pub trait RawStore: Send {
    /// Returns the document stored under `key`, if any.
    fn get(&self, key: &str) -> StoreResult<Option<Document>>;

    /// Stores `value` under `key`, replacing any prior document.
    fn set(&mut self, key: &str, value: Document) -> StoreResult<()>;

    /// Removes `key`. Deleting a missing key is a no-op.
    fn delete(&mut self, key: &str) -> StoreResult<()>;

    /// Returns every key currently present.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Makes all prior writes durable.
    fn sync(&mut self) -> StoreResult<()>;

    /// Flushes and marks the store closed. Closing twice is a no-op, but
    /// any other access afterwards fails with [`StoreError::Closed`].
    fn close(&mut self) -> StoreResult<()>;
}

/// Volatile in-memory backend, used for scratch databases and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: BTreeMap<String, Document>,
    closed: bool,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl RawStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Document>> {
        self.guard()?;
        Ok(self.documents.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Document) -> StoreResult<()> {
        self.guard()?;
        self.documents.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> StoreResult<()> {
        self.guard()?;
        self.documents.remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.guard()?;
        Ok(self.documents.keys().cloned().collect())
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.guard()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.closed = true;
        self.documents.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_delete_roundtrip() {
        let mut store = MemoryStore::new();
        store.set("t.row", json!({"a": 1})).unwrap();
        assert_eq!(store.get("t.row").unwrap(), Some(json!({"a": 1})));

        store.delete("t.row").unwrap();
        assert_eq!(store.get("t.row").unwrap(), None);
    }

    #[test]
    fn delete_missing_key_is_noop() {
        let mut store = MemoryStore::new();
        assert!(store.delete("nothing").is_ok());
    }

    #[test]
    fn keys_are_sorted() {
        let mut store = MemoryStore::new();
        store.set("b.1", json!({})).unwrap();
        store.set("a.1", json!({})).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a.1", "b.1"]);
    }

    #[test]
    fn access_after_close_fails() {
        let mut store = MemoryStore::new();
        store.set("t.row", json!({})).unwrap();
        store.close().unwrap();

        assert!(matches!(store.get("t.row"), Err(StoreError::Closed)));
        assert!(matches!(
            store.set("t.row", json!({})),
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.keys(), Err(StoreError::Closed)));
        // Double close is tolerated.
        assert!(store.close().is_ok());
    }
}
