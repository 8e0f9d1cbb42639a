//! Built-in match predicates.
//!
//! Every predicate has the same shape: the stored field value on the left,
//! the optional comparison operand on the right. Type mismatches never fail
//! a query, they simply do not match.

use std::cmp::Ordering;

use serde_json::Value;

/// Signature shared by all predicates, including caller-supplied ones.
pub type PredicateFn = fn(&Value, Option<&Value>) -> bool;

/// Orders two values when they are mutually comparable.
///
/// Numbers compare numerically regardless of their JSON representation,
/// strings lexicographically, booleans with `false < true`. Anything else
/// is incomparable.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn ordered(value: &Value, compare: Option<&Value>, wanted: &[Ordering]) -> bool {
    compare
        .and_then(|c| order(value, c))
        .map_or(false, |o| wanted.contains(&o))
}

pub fn eq(value: &Value, compare: Option<&Value>) -> bool {
    let Some(compare) = compare else { return false };
    if value.is_number() && compare.is_number() {
        return ordered(value, Some(compare), &[Ordering::Equal]);
    }
    value == compare
}

pub fn neq(value: &Value, compare: Option<&Value>) -> bool {
    !eq(value, compare)
}

pub fn gt(value: &Value, compare: Option<&Value>) -> bool {
    ordered(value, compare, &[Ordering::Greater])
}

pub fn lt(value: &Value, compare: Option<&Value>) -> bool {
    ordered(value, compare, &[Ordering::Less])
}

pub fn gte(value: &Value, compare: Option<&Value>) -> bool {
    ordered(value, compare, &[Ordering::Greater, Ordering::Equal])
}

pub fn lte(value: &Value, compare: Option<&Value>) -> bool {
    ordered(value, compare, &[Ordering::Less, Ordering::Equal])
}

/// Substring match for strings, membership for arrays, key presence for
/// objects.
pub fn contains(value: &Value, compare: Option<&Value>) -> bool {
    let Some(compare) = compare else { return false };
    match value {
        Value::String(s) => compare.as_str().map_or(false, |c| s.contains(c)),
        Value::Array(items) => items.contains(compare),
        Value::Object(map) => compare.as_str().map_or(false, |c| map.contains_key(c)),
        _ => false,
    }
}

pub fn not_contains(value: &Value, compare: Option<&Value>) -> bool {
    !contains(value, compare)
}

pub fn begins_with(value: &Value, compare: Option<&Value>) -> bool {
    match (value.as_str(), compare.and_then(Value::as_str)) {
        (Some(v), Some(c)) => v.starts_with(c),
        _ => false,
    }
}

pub fn not_begins_with(value: &Value, compare: Option<&Value>) -> bool {
    !begins_with(value, compare)
}

/// Inclusive range test; the operand is a two-element array `[low, high]`.
pub fn between(value: &Value, compare: Option<&Value>) -> bool {
    let Some(bounds) = compare.and_then(Value::as_array) else {
        return false;
    };
    let (Some(low), Some(high)) = (bounds.first(), bounds.get(1)) else {
        return false;
    };
    gte(value, Some(low)) && lte(value, Some(high))
}

pub fn not_between(value: &Value, compare: Option<&Value>) -> bool {
    !between(value, compare)
}

/// Membership of the stored value in the operand collection. Mirrors
/// [`contains`] with the sides swapped.
pub fn is_in(value: &Value, compare: Option<&Value>) -> bool {
    compare.map_or(false, |c| contains(c, Some(value)))
}

pub fn not_in(value: &Value, compare: Option<&Value>) -> bool {
    !is_in(value, compare)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_treats_integral_float_and_int_alike() {
        assert!(eq(&json!(10), Some(&json!(10.0))));
        assert!(!eq(&json!(10), Some(&json!("10"))));
    }

    #[test]
    fn ordering_predicates_on_strings_and_numbers() {
        assert!(gt(&json!(3), Some(&json!(2))));
        assert!(lt(&json!("abc"), Some(&json!("abd"))));
        assert!(gte(&json!(2), Some(&json!(2))));
        assert!(lte(&json!(2), Some(&json!(2))));
        // Incomparable types never match.
        assert!(!gt(&json!("3"), Some(&json!(2))));
    }

    #[test]
    fn contains_covers_strings_arrays_and_objects() {
        assert!(contains(&json!("hello world"), Some(&json!("world"))));
        assert!(contains(&json!([1, 2, 3]), Some(&json!(2))));
        assert!(contains(&json!({"a": 1}), Some(&json!("a"))));
        assert!(not_contains(&json!([1, 2, 3]), Some(&json!(4))));
    }

    #[test]
    fn begins_with_is_string_only() {
        assert!(begins_with(&json!("value2"), Some(&json!("value"))));
        assert!(!begins_with(&json!(42), Some(&json!("4"))));
    }

    #[test]
    fn between_is_inclusive() {
        assert!(between(&json!(5), Some(&json!([1, 5]))));
        assert!(between(&json!(1), Some(&json!([1, 5]))));
        assert!(not_between(&json!(6), Some(&json!([1, 5]))));
    }

    #[test]
    fn is_in_checks_the_operand_collection() {
        assert!(is_in(&json!(2), Some(&json!([1, 2, 3]))));
        assert!(is_in(&json!("bc"), Some(&json!("abcd"))));
        assert!(not_in(&json!(9), Some(&json!([1, 2, 3]))));
    }
}
