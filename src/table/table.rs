//! Table handles over the flat composite-key space.

use serde_json::json;

use super::field::Field;
use super::index::{self, INDEX_SUFFIX};
use crate::db::{Database, DatabaseState};
use crate::entry::{Defaults, Entry};
use crate::errors::{type_error, DbResult};
use crate::query::{PredicateFn, Query, QueryParams};
use crate::Document;

/// A named view over the database's key space.
///
/// A table stores each row under the composite key `<table>.<rowKey>` and
/// keeps its secondary indexes in the sibling meta-table `<table>__index`.
/// Handles are cheap to clone and borrow the database for their lifetime.
#[derive(Clone)]
pub struct Table<'db> {
    db: &'db Database,
    name: String,
}

impl<'db> Table<'db> {
    pub(crate) fn new(db: &'db Database, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
        }
    }

    /// Table name without any namespace decoration.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn database(&self) -> &'db Database {
        self.db
    }

    fn composite(&self, row_key: &str) -> String {
        format!("{}.{}", self.name, row_key)
    }

    fn index_composite(&self, field_key: &str) -> String {
        format!("{}{}.{}", self.name, INDEX_SUFFIX, field_key)
    }

    /// Row keys present in this table, sorted.
    pub fn keys(&self) -> DbResult<Vec<String>> {
        let state = self.db.state();
        let prefix = format!("{}.", self.name);
        Ok(state
            .composite_keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Whether a row exists under `row_key`.
    pub fn contains(&self, row_key: &str) -> DbResult<bool> {
        let composite = self.composite(row_key);
        let state = self.db.state();
        Ok(state.composite_keys()?.iter().any(|key| *key == composite))
    }

    /// Reads the raw row document. Missing rows read as empty objects.
    pub fn get_document(&self, row_key: &str) -> DbResult<Document> {
        self.db.state().raw_get(&self.composite(row_key))
    }

    /// Reads a row as a live [`Entry`] carrying this table's defaults.
    ///
    /// A row that is not a document reads as an empty object rather than
    /// failing, so damage stays confined to the affected row.
    pub fn get(&self, row_key: &str) -> DbResult<Entry<'db>> {
        let mut doc = self.get_document(row_key)?;
        if !doc.is_object() {
            tracing::warn!(
                table = %self.name,
                row = row_key,
                "row is not a document, reading as empty object"
            );
            doc = json!({});
        }
        let defaults = self
            .db
            .state()
            .tables
            .get(&self.name)
            .and_then(|table| table.defaults.clone());
        Entry::bound(self.clone(), row_key, doc, defaults)
    }

    /// Writes a row, keeping every index on this table current.
    ///
    /// Rows must be JSON objects. Index maintenance and the row write happen
    /// under one critical section so no reader observes a row without its
    /// index entries.
    pub fn set(&self, row_key: &str, value: Document) -> DbResult<()> {
        if !value.is_object() {
            return Err(type_error(format!(
                "row '{}' in table '{}' must be an object",
                row_key, self.name
            )));
        }
        let mut state = self.db.state();
        let old = state.raw_get(&self.composite(row_key))?;
        for (field_key, field) in self.indexed_fields(&state) {
            let old_value = field.lookup(&old).cloned();
            let new_value = field.lookup(&value).cloned();
            if old_value == new_value {
                continue;
            }
            self.apply_index_delta(
                &mut state,
                &field_key,
                row_key,
                old_value.as_ref(),
                new_value.as_ref(),
            )?;
        }
        state.raw_write(&self.composite(row_key), value);
        self.db.flush_after_write(&mut state)
    }

    /// Deletes a row and retires its index entries.
    /// Deleting a nonexistent row is a no-op.
    pub fn delete(&self, row_key: &str) -> DbResult<()> {
        let mut state = self.db.state();
        let composite = self.composite(row_key);
        let old = state.raw_get(&composite)?;
        for (field_key, field) in self.indexed_fields(&state) {
            let old_value = field.lookup(&old).cloned();
            if old_value.is_none() {
                continue;
            }
            self.apply_index_delta(&mut state, &field_key, row_key, old_value.as_ref(), None)?;
        }
        state.raw_delete(&composite)?;
        self.db.flush_after_write(&mut state)
    }

    /// Shallow-merges `patch` into the stored row and writes the result.
    pub fn update(&self, row_key: &str, patch: Document) -> DbResult<()> {
        let Some(patch) = patch.as_object().cloned() else {
            return Err(type_error(format!(
                "update patch for '{}' in table '{}' must be an object",
                row_key, self.name
            )));
        };
        let mut merged = self.get_document(row_key)?;
        if !merged.is_object() {
            merged = json!({});
        }
        if let Some(target) = merged.as_object_mut() {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        self.set(row_key, merged)
    }

    /// Attaches a default-value table applied to entries read from here.
    pub fn set_defaults(&self, defaults: Defaults) {
        let mut state = self.db.state();
        state
            .tables
            .entry(self.name.clone())
            .or_default()
            .defaults = Some(defaults);
    }

    /// Creates indexes over the given fields and builds them from the
    /// current rows. Fields already indexed are left untouched.
    pub fn create_indexes<F: Into<Field>>(
        &self,
        fields: impl IntoIterator<Item = F>,
    ) -> DbResult<()> {
        let mut state = self.db.state();
        let mut created = Vec::new();
        {
            let table = state.tables.entry(self.name.clone()).or_default();
            for field in fields {
                let field: Field = field.into();
                let field_key = field.key();
                if table.indexes.contains_key(&field_key) {
                    continue;
                }
                table.indexes.insert(
                    field_key.clone(),
                    crate::db::IndexState {
                        field: field.clone(),
                        stale: false,
                    },
                );
                created.push((field_key, field));
            }
        }
        for (field_key, field) in &created {
            self.rebuild_index(&mut state, field_key, field)?;
        }
        self.db.flush_after_write(&mut state)
    }

    /// Rebuilds every index on this table from the current rows, clearing
    /// any staleness.
    pub fn refresh_indexes(&self) -> DbResult<()> {
        let mut state = self.db.state();
        for (field_key, field) in self.indexed_fields(&state) {
            self.rebuild_index(&mut state, &field_key, &field)?;
        }
        self.db.flush_after_write(&mut state)
    }

    /// Rebuilds only the index on `field`. Unindexed fields are a no-op.
    pub fn refresh_index(&self, field: impl Into<Field>) -> DbResult<()> {
        let field: Field = field.into();
        let field_key = field.key();
        let mut state = self.db.state();
        let registered = state
            .tables
            .get(&self.name)
            .map_or(false, |table| table.indexes.contains_key(&field_key));
        if registered {
            self.rebuild_index(&mut state, &field_key, &field)?;
            self.db.flush_after_write(&mut state)?;
        }
        Ok(())
    }

    /// Field keys of indexes currently marked stale.
    pub fn stale_indexes(&self) -> Vec<String> {
        let state = self.db.state();
        state
            .tables
            .get(&self.name)
            .map(|table| {
                table
                    .indexes
                    .iter()
                    .filter(|(_, index)| index.stale)
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Index row document for `field_key`, or `None` when no fresh index
    /// covers that field.
    pub(crate) fn index_document_if_fresh(&self, field_key: &str) -> DbResult<Option<Document>> {
        let state = self.db.state();
        let fresh = state
            .tables
            .get(&self.name)
            .and_then(|table| table.indexes.get(field_key))
            .map(|index| !index.stale)
            .unwrap_or(false);
        if !fresh {
            return Ok(None);
        }
        Ok(Some(state.raw_get(&self.index_composite(field_key))?))
    }

    /// A query over every row of this table.
    pub fn all(&self) -> DbResult<Query<'db>> {
        Query::all(self.clone())
    }

    /// Rows whose `field` value satisfies `predicate` under `params`.
    pub fn query(
        &self,
        field: impl Into<Field>,
        predicate: PredicateFn,
        params: QueryParams,
    ) -> DbResult<Query<'db>> {
        Query::run(self.clone(), field.into(), predicate, params)
    }

    /// Rows where `field` is absent or null, up to `limit` when given.
    pub fn query_none(
        &self,
        field: impl Into<Field>,
        limit: Option<usize>,
    ) -> DbResult<Query<'db>> {
        Query::run_none(self.clone(), field.into(), limit)
    }

    /// Flushes the whole database, pending writes included.
    pub fn sync(&self) -> DbResult<()> {
        self.db.sync()
    }

    fn indexed_fields(&self, state: &DatabaseState) -> Vec<(String, Field)> {
        state
            .tables
            .get(&self.name)
            .map(|table| {
                table
                    .indexes
                    .iter()
                    .map(|(key, index)| (key.clone(), index.field.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Moves one row key between index buckets. A removal that misses its
    /// bucket marks the index stale instead of failing the write.
    fn apply_index_delta(
        &self,
        state: &mut DatabaseState,
        field_key: &str,
        row_key: &str,
        old_value: Option<&Document>,
        new_value: Option<&Document>,
    ) -> DbResult<()> {
        let index_key = self.index_composite(field_key);
        let mut index_doc = state.raw_get(&index_key)?;
        let mut went_stale = false;
        if let Some(bucket) = old_value.and_then(index::bucket_key) {
            if !index::remove_from_bucket(&mut index_doc, &bucket, row_key) {
                went_stale = true;
            }
        }
        if let Some(value) = new_value {
            if let Some(bucket) = index::bucket_key(value) {
                index::add_to_bucket(&mut index_doc, &bucket, value, row_key);
            }
        }
        if went_stale {
            // The flag travels with the index row so staleness survives a
            // close and reopen.
            index::mark_stale(&mut index_doc);
        }
        state.raw_write(&index_key, index_doc);
        if went_stale {
            tracing::warn!(
                table = %self.name,
                field = field_key,
                row = row_key,
                "index bucket missing during maintenance, marking index stale"
            );
            if let Some(table) = state.tables.get_mut(&self.name) {
                if let Some(index) = table.indexes.get_mut(field_key) {
                    index.stale = true;
                }
            }
        }
        Ok(())
    }

    /// Rebuilds one index from the live rows in a single document write, so
    /// readers see either the old index or the new one.
    fn rebuild_index(
        &self,
        state: &mut DatabaseState,
        field_key: &str,
        field: &Field,
    ) -> DbResult<()> {
        let prefix = format!("{}.", self.name);
        let mut doc = json!({});
        for composite in state.composite_keys()? {
            let Some(row_key) = composite.strip_prefix(&prefix) else {
                continue;
            };
            let row_key = row_key.to_string();
            let row = state.raw_get(&composite)?;
            let Some(value) = field.lookup(&row) else {
                continue;
            };
            let Some(bucket) = index::bucket_key(value) else {
                continue;
            };
            index::add_to_bucket(&mut doc, &bucket, value, &row_key);
        }
        state.raw_write(&self.index_composite(field_key), doc);
        if let Some(table) = state.tables.get_mut(&self.name) {
            if let Some(index) = table.indexes.get_mut(field_key) {
                index.stale = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseOptions;
    use crate::errors::DbError;

    fn db() -> Database {
        Database::in_memory(DatabaseOptions::default())
    }

    #[test]
    fn set_and_get_document() {
        let db = db();
        let table = db.table("users").unwrap();
        table.set("u1", json!({"name": "ada"})).unwrap();
        assert_eq!(table.get_document("u1").unwrap(), json!({"name": "ada"}));
    }

    #[test]
    fn non_object_row_is_rejected() {
        let db = db();
        let table = db.table("users").unwrap();
        assert!(matches!(
            table.set("u1", json!(42)),
            Err(DbError::Type(_))
        ));
    }

    #[test]
    fn keys_are_scoped_and_sorted() {
        let db = db();
        let table = db.table("users").unwrap();
        table.set("b", json!({})).unwrap();
        table.set("a", json!({})).unwrap();
        db.table("other").unwrap().set("z", json!({})).unwrap();
        assert_eq!(table.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn contains_and_delete() {
        let db = db();
        let table = db.table("users").unwrap();
        table.set("u1", json!({"name": "ada"})).unwrap();
        assert!(table.contains("u1").unwrap());
        table.delete("u1").unwrap();
        assert!(!table.contains("u1").unwrap());
        assert_eq!(table.get_document("u1").unwrap(), json!({}));
    }

    #[test]
    fn update_merges_shallowly() {
        let db = db();
        let table = db.table("users").unwrap();
        table.set("u1", json!({"name": "ada", "age": 36})).unwrap();
        table.update("u1", json!({"age": 37})).unwrap();
        assert_eq!(
            table.get_document("u1").unwrap(),
            json!({"name": "ada", "age": 37})
        );
    }

    #[test]
    fn create_indexes_builds_from_existing_rows() {
        let db = db();
        let table = db.table("users").unwrap();
        table.set("u1", json!({"color": "red"})).unwrap();
        table.set("u2", json!({"color": "red"})).unwrap();
        table.set("u3", json!({"color": "blue"})).unwrap();
        table.create_indexes(["color"]).unwrap();

        let index = table.index_document_if_fresh("color").unwrap().unwrap();
        assert_eq!(index["s:red"]["keys"], json!(["u1", "u2"]));
        assert_eq!(index["s:blue"]["keys"], json!(["u3"]));
    }

    #[test]
    fn set_keeps_index_current() {
        let db = db();
        let table = db.table("users").unwrap();
        table.create_indexes(["color"]).unwrap();
        table.set("u1", json!({"color": "red"})).unwrap();
        table.set("u1", json!({"color": "blue"})).unwrap();

        let index = table.index_document_if_fresh("color").unwrap().unwrap();
        assert!(index.get("s:red").is_none());
        assert_eq!(index["s:blue"]["keys"], json!(["u1"]));
    }

    #[test]
    fn delete_retires_index_entries() {
        let db = db();
        let table = db.table("users").unwrap();
        table.create_indexes(["color"]).unwrap();
        table.set("u1", json!({"color": "red"})).unwrap();
        table.delete("u1").unwrap();

        let index = table.index_document_if_fresh("color").unwrap().unwrap();
        assert_eq!(index, json!({}));
    }

    #[test]
    fn nested_field_index() {
        let db = db();
        let table = db.table("rows").unwrap();
        table.set("r1", json!({"deep": {"key": 10}})).unwrap();
        table.create_indexes([("deep", "key")]).unwrap();

        let field: Field = ("deep", "key").into();
        let index = table
            .index_document_if_fresh(&field.key())
            .unwrap()
            .unwrap();
        assert_eq!(index["n:10"]["keys"], json!(["r1"]));
    }

    #[test]
    fn missing_bucket_marks_index_stale() {
        let db = db();
        let table = db.table("users").unwrap();
        table.create_indexes(["color"]).unwrap();
        table.set("u1", json!({"color": "red"})).unwrap();
        // Corrupt the index row behind the table's back.
        db.raw_write(&format!("users{INDEX_SUFFIX}.color"), json!({}))
            .unwrap();
        table.set("u1", json!({"color": "blue"})).unwrap();

        assert_eq!(table.stale_indexes(), vec!["color"]);
        assert!(table.index_document_if_fresh("color").unwrap().is_none());

        table.refresh_index("color").unwrap();
        assert!(table.stale_indexes().is_empty());
        let index = table.index_document_if_fresh("color").unwrap().unwrap();
        assert_eq!(index["s:blue"]["keys"], json!(["u1"]));
    }

    #[test]
    fn indexes_survive_table_handle_recreation() {
        let db = db();
        {
            let table = db.table("users").unwrap();
            table.create_indexes(["color"]).unwrap();
            table.set("u1", json!({"color": "red"})).unwrap();
        }
        let table = db.table("users").unwrap();
        table.set("u2", json!({"color": "red"})).unwrap();
        let index = table.index_document_if_fresh("color").unwrap().unwrap();
        assert_eq!(index["s:red"]["keys"], json!(["u1", "u2"]));
    }
}
