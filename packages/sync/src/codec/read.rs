//! Tolerant field readers
//!
//! A field may be stored as a plain `Any` (freshly inserted) or as a live
//! structured type (`YText`, `YArray`, `YMap`) once it has been edited in
//! place. Every reader first normalizes the stored value to `Any`, then
//! type-checks before touching its structure. Nothing here mutates the
//! document.

use chrono::{DateTime, TimeZone, Utc};
use sleuth_model::Timestamp;
use std::collections::HashMap;
use yrs::types::ToJson;
use yrs::{Any, GetString, Map, MapRef, ReadTxn, Value};

/// Plain view of one node: field name to normalized value
pub type FieldMap = HashMap<String, Any>;

/// Convert any stored value into its plain equivalent
pub fn normalize<T: ReadTxn>(txn: &T, value: Value) -> Any {
    match value {
        Value::Any(any) => any,
        Value::YText(text) => Any::String(text.get_string(txn).into()),
        Value::YArray(array) => array.to_json(txn),
        Value::YMap(map) => map.to_json(txn),
        _ => Any::Undefined,
    }
}

/// Read every field of a live node
pub fn node_fields<T: ReadTxn>(txn: &T, node: &MapRef) -> FieldMap {
    node.iter(txn)
        .map(|(key, value)| (key.to_string(), normalize(txn, value)))
        .collect()
}

/// Read a collection entry, accepting either a live map or a plain map
pub fn entry_fields<T: ReadTxn>(txn: &T, collection: &MapRef, id: &str) -> Option<FieldMap> {
    match collection.get(txn, id)? {
        Value::YMap(node) => Some(node_fields(txn, &node)),
        Value::Any(Any::Map(plain)) => Some(plain.as_ref().clone()),
        _ => None,
    }
}

pub fn as_str(value: Option<&Any>) -> Option<&str> {
    match value {
        Some(Any::String(s)) => Some(s.as_ref()),
        _ => None,
    }
}

pub fn read_string(fields: &FieldMap, key: &str) -> String {
    match fields.get(key) {
        Some(Any::String(s)) => s.to_string(),
        Some(Any::Number(n)) => n.to_string(),
        Some(Any::BigInt(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub fn read_opt_string(fields: &FieldMap, key: &str) -> Option<String> {
    as_str(fields.get(key))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn as_f64(value: Option<&Any>) -> Option<f64> {
    match value {
        Some(Any::Number(n)) if n.is_finite() => Some(*n),
        Some(Any::BigInt(n)) => Some(*n as f64),
        _ => None,
    }
}

pub fn read_f64(fields: &FieldMap, key: &str) -> Option<f64> {
    as_f64(fields.get(key))
}

pub fn read_bool(fields: &FieldMap, key: &str) -> bool {
    matches!(fields.get(key), Some(Any::Bool(true)))
}

/// Dates are stored as RFC 3339 strings. Epoch milliseconds are accepted
/// for nodes written by older clients.
pub fn as_datetime(value: Option<&Any>) -> Option<Timestamp> {
    match value {
        Some(Any::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Some(Any::Number(ms)) if ms.is_finite() => Utc.timestamp_millis_opt(*ms as i64).single(),
        Some(Any::BigInt(ms)) => Utc.timestamp_millis_opt(*ms).single(),
        _ => None,
    }
}

pub fn read_datetime(fields: &FieldMap, key: &str) -> Option<Timestamp> {
    as_datetime(fields.get(key))
}

pub fn as_list(value: Option<&Any>) -> &[Any] {
    match value {
        Some(Any::Array(items)) => items.as_ref(),
        _ => &[],
    }
}

pub fn as_object(value: Option<&Any>) -> Option<&HashMap<String, Any>> {
    match value {
        Some(Any::Map(map)) => Some(map.as_ref()),
        _ => None,
    }
}

/// Ordered list of strings with duplicates dropped (first occurrence wins)
pub fn read_string_set(fields: &FieldMap, key: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in as_list(fields.get(key)) {
        if let Any::String(s) = item {
            if !out.iter().any(|existing| existing.as_str() == s.as_ref()) {
                out.push(s.to_string());
            }
        }
    }
    out
}

/// Ordered list of strings, duplicates kept
pub fn read_string_list(fields: &FieldMap, key: &str) -> Vec<String> {
    as_list(fields.get(key))
        .iter()
        .filter_map(|item| match item {
            Any::String(s) => Some(s.to_string()),
            _ => None,
        })
        .collect()
}
