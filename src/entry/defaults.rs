//! Default-value tables attached to entries.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::table::Field;

/// A computed field resolved by cross-referencing another table instead of
/// being stored literally. Joins are read-only views: they never materialize
/// into the document and cannot be assigned.
#[derive(Debug, Clone)]
pub enum Join {
    /// Resolves to one row of `table`, keyed by this row's `field` value, or
    /// by this row's own key when `field` is `None`.
    Direct {
        table: String,
        field: Option<Field>,
    },
    /// Resolves to every row of `table` whose `field` equals this row's key.
    OneToMany { table: String, field: Field },
    /// Resolves through the lookup table `via`: the join key selects a `via`
    /// row whose `reference_key` names the canonical row in `table`. A `via`
    /// row without a `reference_key` falls through to the join key itself.
    Translation {
        table: String,
        via: String,
        field: Option<Field>,
    },
}

impl Join {
    pub fn direct(table: &str) -> Self {
        Join::Direct {
            table: table.to_string(),
            field: None,
        }
    }

    pub fn direct_by(table: &str, field: impl Into<Field>) -> Self {
        Join::Direct {
            table: table.to_string(),
            field: Some(field.into()),
        }
    }

    pub fn one_to_many(table: &str, field: impl Into<Field>) -> Self {
        Join::OneToMany {
            table: table.to_string(),
            field: field.into(),
        }
    }

    pub fn translation(table: &str, via: &str) -> Self {
        Join::Translation {
            table: table.to_string(),
            via: via.to_string(),
            field: None,
        }
    }

    pub fn translation_by(table: &str, via: &str, field: impl Into<Field>) -> Self {
        Join::Translation {
            table: table.to_string(),
            via: via.to_string(),
            field: Some(field.into()),
        }
    }
}

/// One default: a plain value, a computed join, or a nested defaults table
/// applied to a nested map.
#[derive(Debug, Clone)]
pub enum DefaultSpec {
    Value(Value),
    Join(Join),
    Nested(Defaults),
}

/// Defaults for one map level. Plain values deep-copy into the document on
/// first access; joins resolve on every access; nested tables travel down to
/// child entries.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    entries: BTreeMap<String, DefaultSpec>,
}

impl Defaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.entries
            .insert(key.to_string(), DefaultSpec::Value(value.into()));
        self
    }

    pub fn join(mut self, key: &str, join: Join) -> Self {
        self.entries
            .insert(key.to_string(), DefaultSpec::Join(join));
        self
    }

    pub fn nested(mut self, key: &str, defaults: Defaults) -> Self {
        self.entries
            .insert(key.to_string(), DefaultSpec::Nested(defaults));
        self
    }

    pub(crate) fn get(&self, key: &str) -> Option<&DefaultSpec> {
        self.entries.get(key)
    }

    /// Materializable form of this level: plain values and nested tables
    /// only, joins stay computed.
    pub(crate) fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (key, spec) in &self.entries {
            match spec {
                DefaultSpec::Value(value) => {
                    map.insert(key.clone(), value.clone());
                }
                DefaultSpec::Nested(nested) => {
                    map.insert(key.clone(), nested.to_value());
                }
                DefaultSpec::Join(_) => {}
            }
        }
        Value::Object(map)
    }
}
