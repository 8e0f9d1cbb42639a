//! Query execution and composable result sets.

use serde_json::Value;

use super::predicates::PredicateFn;
use crate::entry::Entry;
use crate::errors::DbResult;
use crate::table::{bucket_count, buckets, Field, Table};
use crate::Document;

/// JSON type filter applied before a predicate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    Number,
    String,
    Array,
    Object,
}

impl ValueType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Null => value.is_null(),
            ValueType::Bool => value.is_boolean(),
            ValueType::Int => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_f64(),
            ValueType::Number => value.is_number(),
            ValueType::String => value.is_string(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }
}

/// Optional query controls: a type filter, the predicate operand, and a
/// result cap.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub checktype: Option<ValueType>,
    pub compare: Option<Value>,
    pub limit: Option<usize>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only values of type `checktype` are considered.
    pub fn checktype(mut self, checktype: ValueType) -> Self {
        self.checktype = Some(checktype);
        self
    }

    /// Right-hand operand handed to the predicate.
    pub fn compare(mut self, compare: impl Into<Value>) -> Self {
        self.compare = Some(compare.into());
        self
    }

    /// Stop after `limit` matches.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn admits(&self, value: &Value) -> bool {
        self.checktype.map_or(true, |t| t.matches(value))
    }
}

/// A resolved set of row keys over one table.
///
/// Results are sorted, deduplicated, and fixed at construction; the rows
/// behind them are fetched lazily through [`entries`](Query::entries) or
/// [`documents`](Query::documents). Queries compose: running another query
/// on a result restricts it to the keys already matched.
pub struct Query<'db> {
    table: Table<'db>,
    results: Vec<String>,
}

impl<'db> Query<'db> {
    pub(crate) fn all(table: Table<'db>) -> DbResult<Self> {
        let results = table.keys()?;
        Ok(Self { table, results })
    }

    /// Runs `predicate` over `field`, through the index when one is fresh
    /// and smaller than the candidate set, otherwise by scanning rows.
    ///
    /// Int and Float type filters always scan: ints and integral floats
    /// share a bucket, and a bucket keeps one representative value, so the
    /// index cannot tell the two representations apart.
    pub(crate) fn run(
        table: Table<'db>,
        field: Field,
        predicate: PredicateFn,
        params: QueryParams,
    ) -> DbResult<Self> {
        let candidates = table.keys()?;
        let splits_merged_buckets = matches!(
            params.checktype,
            Some(ValueType::Int) | Some(ValueType::Float)
        );
        if splits_merged_buckets {
            let results = scan(&table, &candidates, &field, predicate, &params)?;
            return Ok(Self { table, results });
        }
        if let Some(index_doc) = table.index_document_if_fresh(&field.key())? {
            if bucket_count(&index_doc) < candidates.len() {
                let mut results = Vec::new();
                for (value, keys) in buckets(&index_doc) {
                    if params.admits(value) && predicate(value, params.compare.as_ref()) {
                        results.extend(keys.iter().map(|k| k.to_string()));
                    }
                }
                results.sort();
                results.dedup();
                // Buckets may mention keys outside the candidate set, e.g.
                // rows written after a bulk-mode snapshot was frozen.
                results.retain(|key| candidates.binary_search(key).is_ok());
                if let Some(limit) = params.limit {
                    results.truncate(limit);
                }
                return Ok(Self { table, results });
            }
        }
        let results = scan(&table, &candidates, &field, predicate, &params)?;
        Ok(Self { table, results })
    }

    /// Rows where `field` is absent or null. Always a scan; null values
    /// carry no index entries.
    pub(crate) fn run_none(
        table: Table<'db>,
        field: Field,
        limit: Option<usize>,
    ) -> DbResult<Self> {
        let candidates = table.keys()?;
        let results = scan_none(&table, &candidates, &field, limit)?;
        Ok(Self { table, results })
    }

    /// Narrows this result set by another predicate.
    pub fn query(
        &self,
        field: impl Into<Field>,
        predicate: PredicateFn,
        params: QueryParams,
    ) -> DbResult<Query<'db>> {
        let results = scan(&self.table, &self.results, &field.into(), predicate, &params)?;
        Ok(Query {
            table: self.table.clone(),
            results,
        })
    }

    /// Narrows this result set to rows where `field` is absent or null.
    pub fn query_none(
        &self,
        field: impl Into<Field>,
        limit: Option<usize>,
    ) -> DbResult<Query<'db>> {
        let results = scan_none(&self.table, &self.results, &field.into(), limit)?;
        Ok(Query {
            table: self.table.clone(),
            results,
        })
    }

    /// Matched row keys, sorted.
    pub fn keys(&self) -> &[String] {
        &self.results
    }

    pub fn into_keys(self) -> Vec<String> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contains(&self, row_key: &str) -> bool {
        self.results.iter().any(|k| k == row_key)
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.results.get(position).map(String::as_str)
    }

    /// Fetches the matched rows as live entries.
    pub fn entries(&self) -> DbResult<Vec<Entry<'db>>> {
        self.results.iter().map(|key| self.table.get(key)).collect()
    }

    /// Fetches the matched rows as raw documents.
    pub fn documents(&self) -> DbResult<Vec<Document>> {
        self.results
            .iter()
            .map(|key| self.table.get_document(key))
            .collect()
    }
}

fn scan(
    table: &Table<'_>,
    candidates: &[String],
    field: &Field,
    predicate: PredicateFn,
    params: &QueryParams,
) -> DbResult<Vec<String>> {
    let mut results = Vec::new();
    for key in candidates {
        if params.limit.map_or(false, |limit| results.len() >= limit) {
            break;
        }
        let doc = table.get_document(key)?;
        let Some(value) = field.lookup(&doc) else {
            continue;
        };
        // Null is queryable only through query_none, matching index reach.
        if value.is_null() {
            continue;
        }
        if params.admits(value) && predicate(value, params.compare.as_ref()) {
            results.push(key.clone());
        }
    }
    Ok(results)
}

fn scan_none(
    table: &Table<'_>,
    candidates: &[String],
    field: &Field,
    limit: Option<usize>,
) -> DbResult<Vec<String>> {
    let mut results = Vec::new();
    for key in candidates {
        if limit.map_or(false, |limit| results.len() >= limit) {
            break;
        }
        let doc = table.get_document(key)?;
        match field.lookup(&doc) {
            None | Some(Value::Null) => results.push(key.clone()),
            Some(_) => {}
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DatabaseOptions};
    use crate::query::predicates;
    use serde_json::json;

    fn seeded() -> Database {
        let db = Database::in_memory(DatabaseOptions::default());
        let table = db.table("rows").unwrap();
        for i in 0..5 {
            table
                .set(&format!("row{i}"), json!({"key": format!("value{i}")}))
                .unwrap();
            table
                .set(&format!("int-row{i}"), json!({"key": i}))
                .unwrap();
        }
        table.set("odd", json!({"other": true})).unwrap();
        db
    }

    #[test]
    fn eq_with_type_filter_separates_overloaded_fields() {
        let db = seeded();
        let table = db.table("rows").unwrap();
        let hits = table
            .query(
                "key",
                predicates::eq,
                QueryParams::new().checktype(ValueType::Int).compare(2),
            )
            .unwrap();
        assert_eq!(hits.keys(), ["int-row2"]);
    }

    #[test]
    fn query_none_finds_rows_missing_the_field() {
        let db = seeded();
        let table = db.table("rows").unwrap();
        let hits = table.query_none("key", None).unwrap();
        assert_eq!(hits.keys(), ["odd"]);
    }

    #[test]
    fn limit_caps_results_in_key_order() {
        let db = seeded();
        let table = db.table("rows").unwrap();
        let hits = table
            .query(
                "key",
                predicates::begins_with,
                QueryParams::new().compare("value").limit(2),
            )
            .unwrap();
        assert_eq!(hits.keys(), ["row0", "row1"]);
    }

    #[test]
    fn chained_queries_intersect() {
        let db = seeded();
        let table = db.table("rows").unwrap();
        let ints = table
            .query(
                "key",
                predicates::gte,
                QueryParams::new().checktype(ValueType::Int).compare(1),
            )
            .unwrap();
        let narrowed = ints
            .query("key", predicates::lt, QueryParams::new().compare(3))
            .unwrap();
        assert_eq!(narrowed.keys(), ["int-row1", "int-row2"]);
    }

    #[test]
    fn indexed_and_scanned_results_agree() {
        let db = seeded();
        let table = db.table("rows").unwrap();
        let scanned = table
            .query(
                "key",
                predicates::eq,
                QueryParams::new().checktype(ValueType::Int).compare(3),
            )
            .unwrap();
        table.create_indexes(["key"]).unwrap();
        let indexed = table
            .query(
                "key",
                predicates::eq,
                QueryParams::new().checktype(ValueType::Int).compare(3),
            )
            .unwrap();
        assert_eq!(scanned.keys(), indexed.keys());
    }

    #[test]
    fn all_returns_every_row() {
        let db = seeded();
        let table = db.table("rows").unwrap();
        assert_eq!(table.all().unwrap().len(), 11);
    }
}
