//! Secondary index bucket layout and maintenance helpers.
//!
//! An index for field `f` on table `t` is one row in the meta-table
//! `t__index`, keyed by the normalized field key. The row document maps each
//! bucket key to `{"value": <field value>, "keys": [rowKey, ...]}`. The
//! original field value travels with the bucket so the query fast path can
//! re-apply predicates and type checks to typed values rather than to the
//! normalized key.

use serde_json::{json, Value};

use crate::backend::checksum;
use crate::Document;

/// Reserved table-name suffix for index meta-tables. Tables carrying it are
/// hidden from database-level enumeration.
pub const INDEX_SUFFIX: &str = "__index";

/// Reserved key in an index row document marking the index as stale.
/// Cannot collide with bucket keys, which always carry a type tag.
pub(crate) const STALE_MARKER: &str = "!stale";

/// Normalizes a field value into a bucket key.
///
/// Keys are tagged by JSON type so values of different types never share a
/// bucket even when they render alike (the string `"10"` and the number
/// `10` stay apart). Numbers render canonically under one tag, so `10` and
/// `10.0` do land in the same bucket. Values that are not primitively
/// usable as keys (arrays, objects) are replaced by a stable digest
/// surrogate of their canonical JSON. Null values are not indexed.
pub fn bucket_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(format!("b:{b}")),
        Value::Number(n) => canonical_number(n).map(|n| format!("n:{n}")),
        Value::String(s) => Some(format!("s:{s}")),
        Value::Array(_) | Value::Object(_) => {
            // serde_json objects serialize with sorted keys, so the digest
            // is stable across semantically identical values.
            let canonical = value.to_string();
            Some(format!("j:{}", checksum::hex_digest(canonical.as_bytes())))
        }
    }
}

/// Canonical string form of a JSON number: integral values render as
/// integers regardless of representation.
pub(crate) fn canonical_number(n: &serde_json::Number) -> Option<String> {
    if let Some(i) = n.as_i64() {
        return Some(i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return Some(u.to_string());
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some((f as i64).to_string())
    } else {
        Some(f.to_string())
    }
}

/// Flags the index row document as stale, persisting the flag alongside
/// the buckets so it survives reopen.
pub(crate) fn mark_stale(index_doc: &mut Document) {
    if let Some(map) = index_doc.as_object_mut() {
        map.insert(STALE_MARKER.to_string(), Value::Bool(true));
    }
}

pub(crate) fn is_stale(index_doc: &Document) -> bool {
    index_doc
        .get(STALE_MARKER)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Adds `row_key` to the bucket for `bucket` in an index row document,
/// creating the bucket if needed. Key lists stay sorted and deduplicated.
pub(crate) fn add_to_bucket(index_doc: &mut Document, bucket: &str, value: &Value, row_key: &str) {
    if !index_doc.is_object() {
        *index_doc = json!({});
    }
    let Some(buckets) = index_doc.as_object_mut() else {
        return;
    };
    let entry = buckets
        .entry(bucket.to_string())
        .or_insert_with(|| json!({"value": value.clone(), "keys": []}));
    if let Some(keys) = entry.get_mut("keys").and_then(Value::as_array_mut) {
        let key_value = Value::String(row_key.to_string());
        if !keys.contains(&key_value) {
            keys.push(key_value);
            keys.sort_by(|a, b| a.as_str().unwrap_or("").cmp(b.as_str().unwrap_or("")));
        }
    }
}

/// Removes `row_key` from the bucket for `bucket`, dropping the bucket once
/// empty. Returns false when the bucket is missing, which signals that the
/// index is stale and needs a full refresh.
pub(crate) fn remove_from_bucket(index_doc: &mut Document, bucket: &str, row_key: &str) -> bool {
    let Some(buckets) = index_doc.as_object_mut() else {
        return false;
    };
    let Some(entry) = buckets.get_mut(bucket) else {
        return false;
    };
    if let Some(keys) = entry.get_mut("keys").and_then(Value::as_array_mut) {
        keys.retain(|k| k.as_str() != Some(row_key));
        if keys.is_empty() {
            buckets.remove(bucket);
        }
    }
    true
}

/// Iterates an index row document as `(value, row keys)` pairs.
pub(crate) fn buckets(index_doc: &Document) -> impl Iterator<Item = (&Value, Vec<&str>)> {
    index_doc
        .as_object()
        .into_iter()
        .flat_map(|buckets| buckets.values())
        .filter_map(|entry| {
            let value = entry.get("value")?;
            let keys = entry
                .get("keys")?
                .as_array()?
                .iter()
                .filter_map(Value::as_str)
                .collect();
            Some((value, keys))
        })
}

/// Number of buckets in an index row document.
pub(crate) fn bucket_count(index_doc: &Document) -> usize {
    index_doc.as_object().map_or(0, |buckets| {
        buckets.keys().filter(|key| *key != STALE_MARKER).count()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_float_and_int_share_a_bucket() {
        assert_eq!(bucket_key(&json!(10)), bucket_key(&json!(10.0)));
    }

    #[test]
    fn alike_renderings_of_different_types_stay_apart() {
        assert_ne!(bucket_key(&json!(10)), bucket_key(&json!("10")));
        assert_ne!(bucket_key(&json!(true)), bucket_key(&json!("true")));
    }

    #[test]
    fn null_is_not_indexed() {
        assert_eq!(bucket_key(&Value::Null), None);
    }

    #[test]
    fn structured_values_get_stable_surrogates() {
        let a = bucket_key(&json!({"x": 1, "y": 2})).unwrap();
        let b = bucket_key(&json!({"y": 2, "x": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), "j:".len() + 32);
    }

    #[test]
    fn stale_marker_is_invisible_to_bucket_iteration() {
        let mut doc = json!({});
        add_to_bucket(&mut doc, "s:red", &json!("red"), "row1");
        mark_stale(&mut doc);
        assert!(is_stale(&doc));
        assert_eq!(bucket_count(&doc), 1);
        assert_eq!(buckets(&doc).count(), 1);
    }

    #[test]
    fn add_and_remove_roundtrip() {
        let mut doc = json!({});
        add_to_bucket(&mut doc, "red", &json!("red"), "row1");
        add_to_bucket(&mut doc, "red", &json!("red"), "row0");
        add_to_bucket(&mut doc, "red", &json!("red"), "row1");

        let collected: Vec<_> = buckets(&doc).collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].1, vec!["row0", "row1"]);

        assert!(remove_from_bucket(&mut doc, "red", "row0"));
        assert!(remove_from_bucket(&mut doc, "red", "row1"));
        // Bucket dropped once empty.
        assert_eq!(bucket_count(&doc), 0);
    }

    #[test]
    fn removing_from_missing_bucket_reports_stale() {
        let mut doc = json!({});
        assert!(!remove_from_bucket(&mut doc, "blue", "row1"));
    }
}
