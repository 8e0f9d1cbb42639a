//! Structured views over row documents.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use super::defaults::{DefaultSpec, Defaults, Join};
use crate::errors::{type_error, DbResult};
use crate::query::{predicates, QueryParams};
use crate::table::{canonical_number, Field, Table};
use crate::Document;

/// One step from the document root toward the viewed node.
#[derive(Debug, Clone)]
enum PathSeg {
    Key(String),
    Index(usize),
}

/// Ties an entry tree back to the row it was read from.
#[derive(Clone)]
struct Binding<'db> {
    table: Table<'db>,
    row_key: String,
}

/// What a key access resolves to.
pub enum EntryValue<'db> {
    /// A scalar, or null for an absent key.
    Value(Value),
    /// A nested map or list, or the row behind a direct or translation join.
    Entry(Entry<'db>),
    /// The rows behind a one-to-many join.
    Entries(Vec<Entry<'db>>),
}

impl<'db> EntryValue<'db> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            EntryValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_entry(self) -> Option<Entry<'db>> {
        match self {
            EntryValue::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn into_entries(self) -> Option<Vec<Entry<'db>>> {
        match self {
            EntryValue::Entries(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EntryValue::Value(Value::Null))
    }
}

/// A live view over one row's document.
///
/// All views into the same row share one document; nested entries address
/// their node by path from the shared root, so a write through any view is
/// immediately visible to every other. Writes on a bound entry persist the
/// whole row when the database runs with `auto_update`.
pub struct Entry<'db> {
    root: Rc<RefCell<Value>>,
    path: Vec<PathSeg>,
    binding: Option<Binding<'db>>,
    defaults: Option<Defaults>,
}

impl<'db> Entry<'db> {
    pub(crate) fn bound(
        table: Table<'db>,
        row_key: &str,
        doc: Document,
        defaults: Option<Defaults>,
    ) -> DbResult<Self> {
        if !doc.is_object() && !doc.is_array() {
            return Err(type_error(format!(
                "row '{}' in table '{}' is not map-like or list-like",
                row_key,
                table.name()
            )));
        }
        Ok(Self {
            root: Rc::new(RefCell::new(doc)),
            path: Vec::new(),
            binding: Some(Binding {
                table,
                row_key: row_key.to_string(),
            }),
            defaults,
        })
    }

    /// A free-standing view over a document with no backing row.
    pub fn detached(doc: Document) -> DbResult<Self> {
        if !doc.is_object() && !doc.is_array() {
            return Err(type_error(
                "an entry must view map-like or list-like data".to_string(),
            ));
        }
        Ok(Self {
            root: Rc::new(RefCell::new(doc)),
            path: Vec::new(),
            binding: None,
            defaults: None,
        })
    }

    fn child(&self, seg: PathSeg, defaults: Option<Defaults>) -> Entry<'db> {
        let mut path = self.path.clone();
        path.push(seg);
        Entry {
            root: Rc::clone(&self.root),
            path,
            binding: self.binding.clone(),
            defaults,
        }
    }

    fn with_node<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let root = self.root.borrow();
        let mut node: Option<&Value> = Some(&root);
        for seg in &self.path {
            node = match (node, seg) {
                (Some(value), PathSeg::Key(key)) => value.get(key.as_str()),
                (Some(value), PathSeg::Index(index)) => value.get(*index),
                (None, _) => None,
            };
        }
        f(node)
    }

    fn with_node_mut<R>(&self, f: impl FnOnce(Option<&mut Value>) -> R) -> R {
        let mut root = self.root.borrow_mut();
        let mut node: Option<&mut Value> = Some(&mut root);
        for seg in &self.path {
            node = match (node, seg) {
                (Some(value), PathSeg::Key(key)) => value.get_mut(key.as_str()),
                (Some(value), PathSeg::Index(index)) => value.get_mut(*index),
                (None, _) => None,
            };
        }
        f(node)
    }

    fn default_spec(&self, key: &str) -> Option<DefaultSpec> {
        self.defaults.as_ref().and_then(|d| d.get(key)).cloned()
    }

    /// Writes the shared document back to the row when this view is bound
    /// and the database runs with `auto_update`.
    fn persist(&self) -> DbResult<()> {
        if let Some(binding) = &self.binding {
            if binding.table.database().options().auto_update {
                let doc = self.root.borrow().clone();
                binding.table.set(&binding.row_key, doc)?;
            }
        }
        Ok(())
    }

    /// Resolves `key` against the document and this level's defaults.
    ///
    /// Join defaults compute on every access and never touch the document.
    /// Plain defaults deep-copy into the document on first access, so a
    /// later raw read of the row sees them too. Absent keys read as null.
    pub fn get(&self, key: &str) -> DbResult<EntryValue<'db>> {
        if let Some(DefaultSpec::Join(join)) = self.default_spec(key) {
            return self.resolve_join(&join);
        }
        let stored = self.with_node(|node| node.and_then(|n| n.get(key)).cloned());
        let value = match stored {
            Some(value) => value,
            None => {
                let Some(spec) = self.default_spec(key) else {
                    return Ok(EntryValue::Value(Value::Null));
                };
                let materialized = match &spec {
                    DefaultSpec::Value(value) => value.clone(),
                    DefaultSpec::Nested(nested) => nested.to_value(),
                    DefaultSpec::Join(_) => Value::Null,
                };
                self.with_node_mut(|node| {
                    if let Some(map) = node.and_then(Value::as_object_mut) {
                        map.insert(key.to_string(), materialized.clone());
                    }
                });
                self.persist()?;
                materialized
            }
        };
        self.wrap(key, value)
    }

    fn wrap(&self, key: &str, value: Value) -> DbResult<EntryValue<'db>> {
        match value {
            Value::Object(_) | Value::Array(_) => {
                let nested = match self.default_spec(key) {
                    Some(DefaultSpec::Nested(defaults)) => Some(defaults),
                    _ => None,
                };
                Ok(EntryValue::Entry(
                    self.child(PathSeg::Key(key.to_string()), nested),
                ))
            }
            scalar => Ok(EntryValue::Value(scalar)),
        }
    }

    /// List element access; nested maps and lists wrap as child entries.
    pub fn get_index(&self, index: usize) -> DbResult<EntryValue<'db>> {
        let value = self.with_node(|node| node.and_then(|n| n.get(index)).cloned());
        match value {
            Some(Value::Object(_)) | Some(Value::Array(_)) => {
                Ok(EntryValue::Entry(self.child(PathSeg::Index(index), None)))
            }
            Some(scalar) => Ok(EntryValue::Value(scalar)),
            None => Ok(EntryValue::Value(Value::Null)),
        }
    }

    /// Walks nested keys depth-first, returning null on any missing segment.
    /// Reads the raw document only; defaults and joins do not apply.
    pub fn recursive_get(&self, path: &[&str]) -> Value {
        self.with_node(|node| {
            let mut current = node;
            for key in path {
                current = current.and_then(|value| value.get(*key));
            }
            current.cloned().unwrap_or(Value::Null)
        })
    }

    /// Sets `key`, writing through to the row under `auto_update`. Keys
    /// whose default is a computed join are read-only.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> DbResult<()> {
        if matches!(self.default_spec(key), Some(DefaultSpec::Join(_))) {
            return Err(type_error(format!(
                "'{key}' is a computed join and cannot be assigned"
            )));
        }
        let applied = self.with_node_mut(|node| match node.and_then(Value::as_object_mut) {
            Some(map) => {
                map.insert(key.to_string(), value.into());
                true
            }
            None => false,
        });
        if !applied {
            return Err(type_error(format!(
                "cannot set '{key}': entry does not view a map"
            )));
        }
        self.persist()
    }

    /// Removes `key`; a missing key is a no-op.
    pub fn remove(&self, key: &str) -> DbResult<()> {
        if matches!(self.default_spec(key), Some(DefaultSpec::Join(_))) {
            return Err(type_error(format!(
                "'{key}' is a computed join and cannot be removed"
            )));
        }
        self.with_node_mut(|node| {
            if let Some(map) = node.and_then(Value::as_object_mut) {
                map.remove(key);
            }
        });
        self.persist()
    }

    /// Appends to a list entry.
    pub fn push(&self, value: impl Into<Value>) -> DbResult<()> {
        let applied = self.with_node_mut(|node| match node.and_then(Value::as_array_mut) {
            Some(items) => {
                items.push(value.into());
                true
            }
            None => false,
        });
        if !applied {
            return Err(type_error(
                "cannot push: entry does not view a list".to_string(),
            ));
        }
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.with_node(|node| match node {
            Some(Value::Object(map)) => map.len(),
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys stored at this level, in document order.
    pub fn keys(&self) -> Vec<String> {
        self.with_node(|node| match node {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.with_node(|node| node.and_then(|n| n.get(key)).is_some())
    }

    /// Snapshot of the viewed node as a plain document.
    pub fn value(&self) -> Document {
        self.with_node(|node| node.cloned().unwrap_or(Value::Null))
    }

    fn resolve_join(&self, join: &Join) -> DbResult<EntryValue<'db>> {
        let Some(binding) = &self.binding else {
            return Err(type_error(
                "computed joins require a row-bound entry".to_string(),
            ));
        };
        let db = binding.table.database();
        match join {
            Join::Direct { table, field } => {
                let Some(key) = self.join_key(field.as_ref(), binding) else {
                    return Ok(EntryValue::Value(Value::Null));
                };
                Ok(EntryValue::Entry(db.table(table)?.get(&key)?))
            }
            Join::OneToMany { table, field } => {
                let other = db.table(table)?;
                let hits = other.query(
                    field.clone(),
                    predicates::eq,
                    QueryParams::new().compare(binding.row_key.clone()),
                )?;
                Ok(EntryValue::Entries(hits.entries()?))
            }
            Join::Translation { table, via, field } => {
                let Some(key) = self.join_key(field.as_ref(), binding) else {
                    return Ok(EntryValue::Value(Value::Null));
                };
                let via_row = db.table(via)?.get_document(&key)?;
                let canonical = via_row
                    .get("reference_key")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(key);
                Ok(EntryValue::Entry(db.table(table)?.get(&canonical)?))
            }
        }
    }

    /// Join key: this row's own key, or the stored field value rendered as
    /// a row key. Numbers render canonically, so `42` and `42.0` address the
    /// same row. Structured values carry no join key.
    fn join_key(&self, field: Option<&Field>, binding: &Binding<'db>) -> Option<String> {
        match field {
            None => Some(binding.row_key.clone()),
            Some(field) => self.with_node(|node| {
                node.and_then(|n| field.lookup(n)).and_then(|value| match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => canonical_number(n),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
            }),
        }
    }
}
